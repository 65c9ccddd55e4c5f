#[cfg(feature = "manager-cacache")]
pub mod cacache;

#[cfg(feature = "manager-moka")]
pub mod moka;
