//! Hardware mocks standing in for the parts of the kernel's environment
//! that don't exist on the host: physical/virtual memory and the tick timer.

pub mod mm;
