pub mod introduce_forget;
pub mod join;
pub mod tree_combine;
