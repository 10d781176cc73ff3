pub mod timesheets;
