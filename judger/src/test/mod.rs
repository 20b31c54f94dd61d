mod tester_tests;
mod util;
