mod derivative_tests;
mod numeric_tests;
