mod redelivery_test;
