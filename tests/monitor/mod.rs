mod pull_monitor_test;
mod push_monitor_test;
mod validator_test;
