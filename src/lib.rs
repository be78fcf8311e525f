pub mod env;
pub mod monitor;
pub mod reward;
pub mod time;
pub mod trace;
pub mod units;

pub(crate) mod data;
pub(crate) mod link;
pub(crate) mod network;
pub(crate) mod sender;

pub use data::{PacketEventKind, PacketRecord};
pub use env::{Action, Config, Env, Error, Step};
pub use network::MiReport;
pub use sender::CcKind;
pub use trace::Trace;
