//! Scenario tests spanning multiple Lattice crates live in `tests/`.
