pub mod identifiers;
pub mod issue;
pub mod value;
