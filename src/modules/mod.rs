pub mod allowlist;
pub mod confinement;
pub mod presence;
pub mod system;
pub mod utils;
