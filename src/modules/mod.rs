pub mod perception;
pub mod timeline;
pub mod action;
pub mod brain;
