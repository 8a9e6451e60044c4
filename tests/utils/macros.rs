#[macro_export]
macro_rules! assert_result {
    ($result:expr) => {
        match $result {
            Ok(_) => {}
            Err(error) => panic!("unexpected error: {error}"),
        }
    };
}
