//! TI-99/4A style BASIC: line parser, program store and execution engine.

pub mod basic_data;
pub mod basic_dialect;
pub mod basic_expressions;
pub mod basic_files;
pub mod basic_format;
pub mod basic_function_registry;
pub mod basic_functions;
pub mod basic_interpreter;
pub mod basic_io;
pub mod basic_keyword_registry;
pub mod basic_lexer;
pub mod basic_operators;
pub mod basic_parser;
pub mod basic_program;
pub mod basic_random;
pub mod basic_reports;
pub mod basic_subprograms;
pub mod basic_symbols;
pub mod basic_types;
