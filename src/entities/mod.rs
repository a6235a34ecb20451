// Entity Models
// The branch roster is the only entity the exports share across reports:
// - raw spelling → canonical name
// - canonical name → region

pub mod branch;

pub use branch::{Branch, BranchRegistry, Region};
