pub mod remote_command;
