pub mod dispatcher;
pub mod profile;
pub mod registry;
pub mod selector;

pub use dispatcher::{DispatchOutcome, DispatchPolicy, Dispatcher};
pub use profile::driver_profile;
pub use registry::DriverRegistry;
pub use selector::{DriverSelector, RandomSelector};
