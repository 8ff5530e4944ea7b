mod test_algorithm;
mod test_stitch_sampling;
