mod common;

mod build_tests;
mod inputs_tests;
mod shell_tests;
