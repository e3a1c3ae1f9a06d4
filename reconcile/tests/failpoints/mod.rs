mod commit_test;
