pub mod config;
pub mod list;
pub mod map;
pub mod run;
pub mod unmap;
