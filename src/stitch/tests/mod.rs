mod test_penalty;
