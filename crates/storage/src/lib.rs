#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    CycleRepository, InMemoryRepository, Storage, StorageError, SubjectRepository,
};
