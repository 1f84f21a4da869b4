pub mod discovery;
pub mod encoding;
pub mod matcher;
pub mod pipeline;
pub mod qa;
pub mod suggest;
