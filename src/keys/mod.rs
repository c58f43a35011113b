pub mod asymmetric;
pub mod params;
pub mod symmetric;

pub use asymmetric::{AsymmetricKey, KeyData, KeyType};
pub use params::{Params, ParamsData};
pub use symmetric::SymmetricKey;
