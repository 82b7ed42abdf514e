pub mod backends;
pub mod gpu_pipeline;
pub mod negotiation;
pub mod notifier;
pub mod provider;
pub mod worker;
