//! Physical key names derived from a base key `K`.

/// `K.partitions`: number of partitions.
pub fn partitions(key: &str) -> String {
    format!("{}.partitions", key)
}

/// `K.type`: aggregate type name.
pub fn type_tag(key: &str) -> String {
    format!("{}.type", key)
}

/// `K.i`: a scalar partition.
pub fn partition(key: &str, index: usize) -> String {
    format!("{}.{}", key, index)
}

/// `K.i.rows`: row count of a collection partition.
pub fn rows(key: &str, index: usize) -> String {
    format!("{}.{}.rows", key, index)
}

/// `K.i.j`: one row.
pub fn row(key: &str, index: usize, row: usize) -> String {
    format!("{}.{}.{}", key, index, row)
}

/// `K.i.j.type`: type tag of one row.
pub fn row_type(key: &str, index: usize, row: usize) -> String {
    format!("{}.{}.{}.type", key, index, row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(partitions("data"), "data.partitions");
        assert_eq!(type_tag("data"), "data.type");
        assert_eq!(partition("data", 4), "data.4");
        assert_eq!(rows("data", 0), "data.0.rows");
        assert_eq!(row("data", 0, 12), "data.0.12");
        assert_eq!(row_type("data", 2, 3), "data.2.3.type");
    }
}
