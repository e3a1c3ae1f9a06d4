mod coordinator_test;
mod reconciler_test;
