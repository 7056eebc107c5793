//! Snapshot storage
//!
//! The store is saved as three JSON arrays (hotels, users, reviews), each in
//! its own file. Saves go to a sibling `.tmp` file first and are renamed over
//! the target, so a crash mid-save leaves the previous snapshot intact.

use crate::store::{Snapshot, User};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{Hotel, Review};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("data file {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("data file {} is empty", .0.display())]
    Empty(PathBuf),

    #[error("cannot parse {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where snapshots are loaded from and saved to
pub trait Persistence: Send + Sync {
    fn load(&self) -> Result<Snapshot, PersistenceError>;
    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
}

/// One pretty-printed JSON file per collection
#[derive(Debug, Clone)]
pub struct JsonFiles {
    pub hotels: PathBuf,
    pub users: PathBuf,
    pub reviews: PathBuf,
}

impl JsonFiles {
    pub fn new(
        hotels: impl Into<PathBuf>,
        users: impl Into<PathBuf>,
        reviews: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hotels: hotels.into(),
            users: users.into(),
            reviews: reviews.into(),
        }
    }

    /// The three standard file names inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join("hotels.json"),
            dir.join("users.json"),
            dir.join("reviews.json"),
        )
    }
}

impl Persistence for JsonFiles {
    fn load(&self) -> Result<Snapshot, PersistenceError> {
        let hotels: Vec<Hotel> = read_collection(&self.hotels)?;
        let users: Vec<User> = read_collection(&self.users)?;
        let reviews: Vec<Review> = read_collection(&self.reviews)?;
        Ok(Snapshot {
            users,
            hotels,
            reviews,
        })
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        write_collection(&self.hotels, &snapshot.hotels)?;
        write_collection(&self.users, &snapshot.users)?;
        write_collection(&self.reviews, &snapshot.reviews)?;
        debug!(
            "Saved {} hotels, {} users, {} reviews",
            snapshot.hotels.len(),
            snapshot.users.len(),
            snapshot.reviews.len()
        );
        Ok(())
    }
}

fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistenceError> {
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => PersistenceError::Missing(path.to_path_buf()),
        _ => PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    if text.trim().is_empty() {
        return Err(PersistenceError::Empty(path.to_path_buf()));
    }
    serde_json::from_str(&text).map_err(|source| PersistenceError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn write_collection<T: Serialize>(path: &Path, items: &[T]) -> Result<(), PersistenceError> {
    let body = serde_json::to_vec_pretty(items)?;
    let io_error = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, body).map_err(io_error)?;
    fs::rename(&temp_path, path).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::hash_password;
    use shared::Ratings;
    use tempfile::tempdir;
    use tokio_test::assert_ok;

    fn sample_snapshot() -> Snapshot {
        let mut hotel = Hotel::new(1, "Plaza", "Rome");
        hotel.services = vec!["Wi-Fi".to_string()];
        hotel.number_of_reviews = 1;
        hotel.scores.ranking_score = 30.0;

        Snapshot {
            users: vec![User::new("bob", hash_password("Secret123"))],
            hotels: vec![hotel],
            reviews: vec![Review {
                user_id: "bob".to_string(),
                time: 1_700_000_000_000,
                hotel_name: "Plaza".to_string(),
                city: "Rome".to_string(),
                global_score: 4,
                single_scores: Ratings::from_scores([5, 4, 3, 5]),
            }],
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let files = JsonFiles::in_dir(dir.path());
        let snapshot = sample_snapshot();

        assert_ok!(files.save(&snapshot));
        let loaded = files.load().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!dir.path().join("hotels.json.tmp").exists());
    }

    #[test]
    fn test_saved_files_use_data_file_field_names() {
        let dir = tempdir().unwrap();
        let files = JsonFiles::in_dir(dir.path());
        assert_ok!(files.save(&sample_snapshot()));

        let hotels = fs::read_to_string(&files.hotels).unwrap();
        assert!(hotels.contains("\"numberOfReviews\""));
        assert!(hotels.contains("\"rankingScore\""));
        let reviews = fs::read_to_string(&files.reviews).unwrap();
        assert!(reviews.contains("\"userId\""));
        assert!(reviews.contains("\"singleScores\""));
        let users = fs::read_to_string(&files.users).unwrap();
        assert!(users.contains("\"idClient\": -1"));
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let files = JsonFiles::in_dir(dir.path().join("nested").join("data"));
        assert_ok!(files.save(&Snapshot::default()));
        assert_eq!(files.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let files = JsonFiles::in_dir(dir.path());
        assert!(matches!(files.load(), Err(PersistenceError::Missing(_))));
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let files = JsonFiles::in_dir(dir.path());
        assert_ok!(files.save(&Snapshot::default()));
        fs::write(&files.users, "  \n").unwrap();
        assert!(matches!(files.load(), Err(PersistenceError::Empty(_))));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let files = JsonFiles::in_dir(dir.path());
        assert_ok!(files.save(&Snapshot::default()));
        fs::write(&files.reviews, "[{\"userId\": ").unwrap();
        assert!(matches!(
            files.load(),
            Err(PersistenceError::Malformed { .. })
        ));
    }
}
