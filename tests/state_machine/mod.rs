mod monotonicity_test;
