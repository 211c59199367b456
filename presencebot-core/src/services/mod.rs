pub mod session_manager;

pub use session_manager::{
    HealthReport, HolderStart, ManagerSettings, ManagerStores, SessionManager, StartFailure,
    StartReport,
};
