//! Typed request parameters.
//!
//! Helpers that read a named parameter from a [`ParamSource`] (a decoded form
//! or the query string of an [`Exchange`]) and convert it, failing with
//! [`HandlerError::InvalidInput`] so the connection answers with a 400.
//!
//! ```no_run
//! use minihttp::exchange::Exchange;
//! use minihttp::protocol::HandlerError;
//! use minihttp_web::params;
//!
//! fn page(exchange: &Exchange<'_>) -> Result<(String, u32), HandlerError> {
//!     let name = params::mandatory_string(exchange, "name")?.to_owned();
//!     let page = params::bounded_number(exchange, "page", 1, 1, 100)?;
//!     Ok((name, page))
//! }
//! ```

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::str::FromStr;

use minihttp::exchange::Exchange;
use minihttp::protocol::HandlerError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Where named parameters come from.
pub trait ParamSource {
    fn param(&self, name: &str) -> Option<&str>;
}

impl<S: BuildHasher> ParamSource for HashMap<String, String, S> {
    fn param(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Reads decoded query parameters.
impl ParamSource for Exchange<'_> {
    fn param(&self, name: &str) -> Option<&str> {
        self.query_param(name)
    }
}

/// Numbers that can be read from a parameter.
pub trait NumericParam: FromStr + Copy + PartialOrd {
    /// Noun used in the error message, e.g. `an integer`.
    const KIND: &'static str;
}

macro_rules! numeric_param {
    ($kind:literal: $($ty:ty),+) => {
        $(impl NumericParam for $ty {
            const KIND: &'static str = $kind;
        })+
    };
}

numeric_param!("an integer": i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
numeric_param!("a double": f32, f64);

fn missing(name: &str) -> HandlerError {
    HandlerError::invalid_input(format!("Missing parameter '{name}'"))
}

pub fn mandatory_string<'s, S>(source: &'s S, name: &str) -> Result<&'s str, HandlerError>
where
    S: ParamSource + ?Sized,
{
    source.param(name).ok_or_else(|| missing(name))
}

pub fn optional_string<'s, S>(source: &'s S, name: &str, default: &'s str) -> &'s str
where
    S: ParamSource + ?Sized,
{
    source.param(name).unwrap_or(default)
}

pub fn mandatory_number<T, S>(source: &S, name: &str) -> Result<T, HandlerError>
where
    T: NumericParam,
    S: ParamSource + ?Sized,
{
    parse_number(name, mandatory_string(source, name)?)
}

pub fn optional_number<T, S>(source: &S, name: &str, default: T) -> Result<T, HandlerError>
where
    T: NumericParam,
    S: ParamSource + ?Sized,
{
    source.param(name).map_or(Ok(default), |value| parse_number(name, value))
}

/// Reads an optional number and clamps it into `minimum..=maximum`.
pub fn bounded_number<T, S>(source: &S, name: &str, minimum: T, default: T, maximum: T) -> Result<T, HandlerError>
where
    T: NumericParam,
    S: ParamSource + ?Sized,
{
    let value = optional_number(source, name, default)?;
    if value < minimum {
        Ok(minimum)
    } else if value > maximum {
        Ok(maximum)
    } else {
        Ok(value)
    }
}

fn parse_number<T: NumericParam>(name: &str, value: &str) -> Result<T, HandlerError> {
    value.trim().parse().map_err(|_| HandlerError::invalid_input(format!("Parameter '{name}' must contain {}", T::KIND)))
}

/// Reads `true` or `false`, ignoring case.
pub fn mandatory_bool<S>(source: &S, name: &str) -> Result<bool, HandlerError>
where
    S: ParamSource + ?Sized,
{
    parse_bool(name, mandatory_string(source, name)?)
}

pub fn optional_bool<S>(source: &S, name: &str, default: bool) -> Result<bool, HandlerError>
where
    S: ParamSource + ?Sized,
{
    source.param(name).map_or(Ok(default), |value| parse_bool(name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, HandlerError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(HandlerError::invalid_input(format!("Parameter '{name}' must contain a boolean")))
    }
}

static EMAIL: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"^[a-z0-9\-_+.]+@[a-z0-9\-.]+$"));

/// Reads a lowercase email address of the form `local@domain`.
pub fn mandatory_email<'s, S>(source: &'s S, name: &str) -> Result<&'s str, HandlerError>
where
    S: ParamSource + ?Sized,
{
    let email = mandatory_string(source, name)?;
    let matcher = EMAIL.as_ref().map_err(|e| HandlerError::internal(e.clone()))?;
    if matcher.is_match(email) {
        Ok(email)
    } else {
        Err(HandlerError::invalid_input(format!("Parameter '{name}' does not contain a valid email address")))
    }
}

/// Reads one of a fixed set of values.
///
/// `allowed` lists the accepted spellings for the error message; an empty
/// value counts as missing.
pub fn mandatory_enum<T, S>(source: &S, name: &str, allowed: &[&str]) -> Result<T, HandlerError>
where
    T: FromStr,
    S: ParamSource + ?Sized,
{
    let value = mandatory_string(source, name)?;
    if value.is_empty() {
        return Err(missing(name));
    }
    parse_enum(value, allowed)
}

/// Like [`mandatory_enum`], falling back to `default` when absent or empty.
pub fn optional_enum<T, S>(source: &S, name: &str, allowed: &[&str], default: T) -> Result<T, HandlerError>
where
    T: FromStr,
    S: ParamSource + ?Sized,
{
    match source.param(name) {
        None | Some("") => Ok(default),
        Some(value) => parse_enum(value, allowed),
    }
}

fn parse_enum<T: FromStr>(value: &str, allowed: &[&str]) -> Result<T, HandlerError> {
    value
        .parse()
        .map_err(|_| HandlerError::invalid_input(format!("Invalid enum '{value}', possible values are: {}", allowed.join(", "))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use minihttp::codec::HeadParser;

    #[derive(Debug, PartialEq)]
    enum Color {
        Red,
        Green,
    }

    impl FromStr for Color {
        type Err = ();

        fn from_str(s: &str) -> Result<Self, ()> {
            match s {
                "RED" => Ok(Color::Red),
                "GREEN" => Ok(Color::Green),
                _ => Err(()),
            }
        }
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    fn message(error: HandlerError) -> String {
        match error {
            HandlerError::InvalidInput { error_code: 400, message } => message,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn strings() {
        let form = form(&[("name", "alice"), ("empty", "")]);

        assert_eq!(mandatory_string(&form, "name").unwrap(), "alice");
        assert_eq!(mandatory_string(&form, "empty").unwrap(), "");
        assert_eq!(message(mandatory_string(&form, "age").unwrap_err()), "Missing parameter 'age'");
        assert_eq!(optional_string(&form, "age", "none"), "none");
    }

    #[test]
    fn numbers() {
        let form = form(&[("count", "42"), ("ratio", "0.5"), ("word", "ten")]);

        assert_eq!(mandatory_number::<i32, _>(&form, "count").unwrap(), 42);
        assert_eq!(mandatory_number::<f64, _>(&form, "ratio").unwrap(), 0.5);
        assert_eq!(optional_number::<u64, _>(&form, "missing", 7).unwrap(), 7);
        assert_eq!(message(mandatory_number::<i64, _>(&form, "word").unwrap_err()), "Parameter 'word' must contain an integer");
        assert_eq!(message(mandatory_number::<f64, _>(&form, "word").unwrap_err()), "Parameter 'word' must contain a double");
    }

    #[test]
    fn bounded_numbers_are_clamped() {
        let form = form(&[("low", "-5"), ("high", "500"), ("mid", "20")]);

        assert_eq!(bounded_number(&form, "low", 0, 10, 100).unwrap(), 0);
        assert_eq!(bounded_number(&form, "high", 0, 10, 100).unwrap(), 100);
        assert_eq!(bounded_number(&form, "mid", 0, 10, 100).unwrap(), 20);
        assert_eq!(bounded_number(&form, "absent", 0, 10, 100).unwrap(), 10);
    }

    #[test]
    fn booleans() {
        let form = form(&[("a", "TRUE"), ("b", "false"), ("c", "yes")]);

        assert!(mandatory_bool(&form, "a").unwrap());
        assert!(!mandatory_bool(&form, "b").unwrap());
        assert!(optional_bool(&form, "d", true).unwrap());
        assert_eq!(message(mandatory_bool(&form, "c").unwrap_err()), "Parameter 'c' must contain a boolean");
    }

    #[test]
    fn emails() {
        let form = form(&[
            ("good", "first.last+tag@example-mail.com"),
            ("plain", "a_b@c"),
            ("upper", "Bob@example.com"),
            ("bare", "bob"),
            ("two", "a@b@c"),
            ("trailing", "bob@example.com "),
            ("empty_local", "@example.com"),
        ]);

        assert_eq!(mandatory_email(&form, "good").unwrap(), "first.last+tag@example-mail.com");
        assert_eq!(mandatory_email(&form, "plain").unwrap(), "a_b@c");
        for name in ["upper", "bare", "two", "trailing", "empty_local"] {
            assert_eq!(
                message(mandatory_email(&form, name).unwrap_err()),
                format!("Parameter '{name}' does not contain a valid email address")
            );
        }
    }

    #[test]
    fn enums() {
        let form = form(&[("color", "RED"), ("bad", "BLUE"), ("blank", "")]);
        let allowed = ["RED", "GREEN"];

        assert_eq!(mandatory_enum::<Color, _>(&form, "color", &allowed).unwrap(), Color::Red);
        assert_eq!(optional_enum(&form, "blank", &allowed, Color::Green).unwrap(), Color::Green);
        assert_eq!(
            message(mandatory_enum::<Color, _>(&form, "bad", &allowed).unwrap_err()),
            "Invalid enum 'BLUE', possible values are: RED, GREEN"
        );
        assert_eq!(message(mandatory_enum::<Color, _>(&form, "blank", &allowed).unwrap_err()), "Missing parameter 'blank'");
    }

    #[test]
    fn query_parameters_of_exchange() {
        let head = HeadParser.parse(Bytes::from_static(b"GET /list?page=3&sort=GREEN HTTP/1.1\r\n\r\n")).unwrap();
        let mut reader: &[u8] = b"";
        let mut writer = Vec::new();
        let exchange = Exchange::new(head, &mut reader, &mut writer, None).unwrap();

        assert_eq!(bounded_number(&exchange, "page", 1, 1, 2).unwrap(), 2);
        assert_eq!(mandatory_enum::<Color, _>(&exchange, "sort", &["RED", "GREEN"]).unwrap(), Color::Green);
        assert!(mandatory_string(&exchange, "q").is_err());
    }
}
