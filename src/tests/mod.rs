mod support;

mod cursor_tests;
