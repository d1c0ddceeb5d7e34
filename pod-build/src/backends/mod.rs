mod engine;

pub use engine::EngineCli;
