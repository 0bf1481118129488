//! Movie catalog records.

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Earliest release year the catalog accepts.
pub const MIN_YEAR: i32 = 1947;

/// Stored movie payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub title: String,
    pub year: i32,
    /// Runtime in minutes.
    pub runtime: i32,
    pub genres: Vec<String>,
}

/// Input for creating a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

impl NewMovie {
    /// Check every field, collecting all failures.
    ///
    /// # Errors
    /// Returns a `ValidationError` naming each invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        check_title(&mut errors, &self.title);
        check_year(&mut errors, self.year);
        check_runtime(&mut errors, self.runtime);
        if self.genres.is_empty() {
            errors.add("genres", "must contain at least one genre");
        }
        check_genres(&mut errors, &self.genres);
        errors.into_result()
    }

    /// Validate and convert into a storable payload.
    ///
    /// # Errors
    /// Returns a `ValidationError` if any field is invalid.
    pub fn into_movie(self) -> Result<Movie, ValidationError> {
        self.validate()?;
        Ok(Movie {
            title: self.title.trim().to_string(),
            year: self.year,
            runtime: self.runtime,
            genres: self.genres,
        })
    }
}

/// Partial update to a movie.
///
/// Scalar fields replace the stored value when present. Genres are merged:
/// each listed genre not already on the movie is appended, preserving order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieUpdate {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Vec<String>,
}

impl MovieUpdate {
    /// Check every present field, collecting all failures.
    ///
    /// # Errors
    /// Returns a `ValidationError` naming each invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        if let Some(title) = &self.title {
            check_title(&mut errors, title);
        }
        if let Some(year) = self.year {
            check_year(&mut errors, year);
        }
        if let Some(runtime) = self.runtime {
            check_runtime(&mut errors, runtime);
        }
        check_genres(&mut errors, &self.genres);
        errors.into_result()
    }

    /// Produce the updated movie. Pure: depends only on `movie` and `self`.
    #[must_use]
    pub fn apply_to(&self, movie: &Movie) -> Movie {
        let mut next = movie.clone();
        if let Some(title) = &self.title {
            next.title = title.trim().to_string();
        }
        if let Some(year) = self.year {
            next.year = year;
        }
        if let Some(runtime) = self.runtime {
            next.runtime = runtime;
        }
        for genre in &self.genres {
            if !next.genres.contains(genre) {
                next.genres.push(genre.clone());
            }
        }
        next
    }
}

fn check_title(errors: &mut ValidationError, title: &str) {
    if title.trim().is_empty() {
        errors.add("title", "must be provided");
    } else if title.len() > 500 {
        errors.add("title", "must not be more than 500 bytes long");
    }
}

fn check_year(errors: &mut ValidationError, year: i32) {
    if year < MIN_YEAR {
        errors.add("year", format!("must be at least {MIN_YEAR}"));
    }
}

fn check_runtime(errors: &mut ValidationError, runtime: i32) {
    if runtime <= 0 {
        errors.add("runtime", "must be a positive integer");
    }
}

fn check_genres(errors: &mut ValidationError, genres: &[String]) {
    if genres.iter().any(|g| g.trim().is_empty()) {
        errors.add("genres", "must not contain empty values");
        return;
    }
    for (i, genre) in genres.iter().enumerate() {
        if genres[..i].contains(genre) {
            errors.add("genres", "must not contain duplicate values");
            return;
        }
    }
}
