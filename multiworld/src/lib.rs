// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod adapter;
pub mod early_items;
pub mod fill;
pub mod json_world;
pub mod pool;
pub mod randomize;
pub mod settings;
pub mod spoiler_log;

pub use adapter::World;
pub use randomize::{generate, Generated, Randomization};
pub use settings::{parse_generation_settings, GenerationSettings};
