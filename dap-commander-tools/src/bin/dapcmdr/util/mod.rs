pub mod logging;

use std::num::ParseIntError;

pub fn parse_u32(input: &str) -> Result<u32, ParseIntError> {
    parse_int::parse(input)
}

pub fn parse_usize(input: &str) -> Result<usize, ParseIntError> {
    parse_int::parse(input)
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::*;

    #[test_case("64" => Ok(64); "decimal")]
    #[test_case("0x40" => Ok(64); "hex")]
    #[test_case("0b1000000" => Ok(64); "binary")]
    fn numbers(input: &str) -> Result<usize, ParseIntError> {
        parse_usize(input)
    }

    #[test]
    fn addresses() {
        assert_eq!(parse_u32("0x20000400"), Ok(0x2000_0400));
        assert!(parse_u32("0x100000000").is_err());
    }
}
