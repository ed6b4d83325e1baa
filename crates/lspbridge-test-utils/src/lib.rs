//! Testing utilities, fixtures, and mocks for lspbridge.
//!
//! This crate provides common testing infrastructure used across the lspbridge workspace:
//!
//! - **Fixtures**: Temporary workspaces with source files on disk
//! - **Mocks**: A scripted, recording language server backend
//! - **Assertions**: Assertion helpers with readable failure output
//! - **Builders**: Short constructors for LSP values
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use lspbridge_test_utils::{builders, MockLspBackend, TestProject};
//!
//! #[tokio::test]
//! async fn test_lookup() {
//!     let project = TestProject::new()
//!         .with_file("a.go", "package a\nfunc F() {}\n")
//!         .build();
//!     let backend = MockLspBackend::new().with_symbols(
//!         "F",
//!         vec![builders::symbol("F", SymbolKind::FUNCTION, project.path().join("a.go"), 1, 5)],
//!     );
//!     // Hand `backend` to a session...
//! }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use fixtures::TestProject;
pub use mocks::{MockCall, MockLspBackend};
