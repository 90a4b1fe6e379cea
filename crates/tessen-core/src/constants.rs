/// Product identifier constants shared across crates
pub const PRODID_VENDOR: &str = "Tessen";
pub const PRODID: &str =
    const_str::concat!("-//", PRODID_VENDOR, "//", PRODID_VENDOR, " Calendar//EN");
