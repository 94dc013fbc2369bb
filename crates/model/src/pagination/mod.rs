pub mod page;
pub mod paging_state;
