pub mod analysis;
pub mod catalog;
pub mod color;
pub mod config;
pub mod fetch;
pub mod legend;
pub mod output;
pub mod properties;
pub mod spatial;
pub mod style;
pub mod view;
