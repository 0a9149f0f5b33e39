mod engine;
mod local;
mod observer;
mod session;

pub use engine::{Catalog, Engine, Sources};
pub use local::Local;
pub use observer::{NoopObserver, Phase, QueryObserver};
pub use session::{Session, Statement, StatementResult};
