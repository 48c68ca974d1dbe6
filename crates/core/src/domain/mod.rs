pub mod condition;
pub mod evidence;
pub mod playbook;
