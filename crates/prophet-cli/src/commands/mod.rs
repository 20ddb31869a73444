pub mod resources;
pub mod run;
