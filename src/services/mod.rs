pub mod catalog;
pub mod classifier;
pub mod draft;
pub mod generation;
pub mod ids;
pub mod orchestrator;
pub mod poller;
pub mod region;
pub mod vendor;
