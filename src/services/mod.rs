pub mod disk_store;
pub mod file_service;
pub mod format;
pub mod object_store;
pub mod signer;
pub mod storage_error;
#[cfg(test)]
mod test_support;
pub mod validation;
