//! Filtered, sorted and paginated movie listings.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{CatalogError, Movie, ValidationError, Versioned, VersionedStore};

/// Largest page size a listing accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Largest page number a listing accepts.
pub const MAX_PAGE: u32 = 10_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Id,
    Title,
    Year,
    Runtime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Listing query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub sort: SortField,
    pub order: SortOrder,
    /// Case-insensitive match against whole words of the title.
    pub title: Option<String>,
    /// Keep only movies carrying every listed genre.
    pub genres: Vec<String>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: SortField::Id,
            order: SortOrder::Asc,
            title: None,
            genres: Vec::new(),
        }
    }
}

impl Filters {
    /// # Errors
    /// Returns a `ValidationError` naming each out-of-range field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        if self.page == 0 || self.page > MAX_PAGE {
            errors.add("page", format!("must be between 1 and {MAX_PAGE}"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            errors.add("page_size", format!("must be between 1 and {MAX_PAGE_SIZE}"));
        }
        errors.into_result()
    }

    fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    fn matches(&self, movie: &Movie) -> bool {
        let title_ok = self.title.as_deref().map_or(true, |wanted| {
            let wanted: Vec<String> = words(wanted).collect();
            if wanted.is_empty() {
                return true;
            }
            let have: Vec<String> = words(&movie.title).collect();
            wanted.iter().all(|w| have.contains(w))
        });
        title_ok && self.genres.iter().all(|g| movie.genres.contains(g))
    }

    fn compare(&self, a: &Versioned<Movie>, b: &Versioned<Movie>) -> Ordering {
        let primary = match self.sort {
            SortField::Id => Ordering::Equal,
            SortField::Title => a.payload.title.to_lowercase().cmp(&b.payload.title.to_lowercase()),
            SortField::Year => a.payload.year.cmp(&b.payload.year),
            SortField::Runtime => a.payload.runtime.cmp(&b.payload.runtime),
        };
        let ordering = primary.then_with(|| a.id.cmp(&b.id));
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Pagination metadata. All fields are zero when nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub current_page: u32,
    pub page_size: u32,
    pub first_page: u32,
    pub last_page: u32,
    pub total_records: u64,
}

impl Metadata {
    fn calculate(total_records: usize, page: u32, page_size: u32) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        let total = total_records as u64;
        let last_page = total.div_ceil(u64::from(page_size));
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            total_records: total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub metadata: Metadata,
}

/// List movies matching `filters`.
///
/// Sorting is stable: ties on the sort field are broken by id, in the same
/// direction as the requested order.
///
/// # Errors
/// - `Invalid` if the filters are out of range
/// - `Store` if the scan fails
pub async fn list<S>(store: &S, filters: &Filters) -> Result<Page<Versioned<Movie>>, CatalogError>
where
    S: VersionedStore<Record = Movie> + ?Sized,
{
    filters.validate()?;

    let mut matched: Vec<Versioned<Movie>> = store
        .scan()
        .await?
        .into_iter()
        .filter(|rec| filters.matches(&rec.payload))
        .collect();
    matched.sort_by(|a, b| filters.compare(a, b));

    let metadata = Metadata::calculate(matched.len(), filters.page, filters.page_size);
    let items = matched
        .into_iter()
        .skip(usize::try_from(filters.offset()).unwrap_or(usize::MAX))
        .take(filters.page_size as usize)
        .collect();

    Ok(Page { items, metadata })
}
