pub mod common;

mod validation;
