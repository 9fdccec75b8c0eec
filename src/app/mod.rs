#[allow(clippy::module_inception)]
mod app;
mod service;

pub(crate) mod final_handler;

pub mod context;
pub mod settings;

pub use app::{app, Application};
pub use context::AppContext;
pub use service::AppService;
pub use settings::{Cidr, Env, EtagMode, QueryParserMode, SettingValue, Settings, TrustProxy};
