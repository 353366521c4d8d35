// Managers for shared channel and history state

mod anomaly_log;
mod broadcast_manager;

pub use anomaly_log::AnomalyLog;
pub use broadcast_manager::BroadcastChannelManager;
