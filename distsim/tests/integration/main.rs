// Integration tests follow the organization suggested by Matklad:
// https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod granted_time_window;
mod null_message;
mod simulation_scheduling;
mod support;
