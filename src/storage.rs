mod pack_storage;
mod traits;

pub use pack_storage::PackStorage;
pub use traits::ObjectStore;
