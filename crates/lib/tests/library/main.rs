mod common;

mod overlay_tests;
mod resolution_tests;
mod scenario_tests;
