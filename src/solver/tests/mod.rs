mod test_dtw;
mod test_local_bb;
mod test_local_solver;
mod test_wale_binder;
