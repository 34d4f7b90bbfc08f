mod local;

pub use local::LocalMetaStore;
