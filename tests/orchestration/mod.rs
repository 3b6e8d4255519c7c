mod experiment_lifecycle_test;
mod termination_test;
