pub mod aggregate;
pub mod classifier;
pub mod error;
pub mod features;
pub mod kinematics;
pub mod oracle;
pub mod output;
pub mod pipeline;
pub mod scoring;
pub mod segmenter;
pub mod store;
pub mod violations;
