/* Parsers for the textual resource-reference grammar used in attribute
   values: "@0x7F010000", "@2130771968" and "@package:type/entry". */

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::{digit1, hex_digit1};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::sequence::{pair, preceded, terminated};
use nom::{IResult, Parser};

use crate::types::ResourceId;

/// A reference to a resource by name rather than packed id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResName {
    pub package: Option<String>,
    pub type_name: String,
    pub entry: String,
}

/// Either textual form a resource reference can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Id(ResourceId),
    Name(ResName),
}

fn ident(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.').parse(i)
}

fn hex_id(i: &str) -> IResult<&str, ResourceId> {
    map_res(
        preceded(pair(tag("@"), tag_no_case("0x")), hex_digit1),
        |digits: &str| u32::from_str_radix(digits, 16).map(ResourceId::new),
    )
    .parse(i)
}

fn dec_id(i: &str) -> IResult<&str, ResourceId> {
    map_res(preceded(tag("@"), digit1), |digits: &str| {
        digits.parse::<u32>().map(ResourceId::new)
    })
    .parse(i)
}

fn name_reference(i: &str) -> IResult<&str, ResName> {
    let (i, _) = tag("@").parse(i)?;
    let (i, package) = opt(terminated(ident, tag(":"))).parse(i)?;
    let (i, type_name) = ident(i)?;
    let (i, _) = tag("/").parse(i)?;
    let (i, entry) = ident(i)?;
    Ok((
        i,
        ResName {
            package: package.map(str::to_string),
            type_name: type_name.to_string(),
            entry: entry.to_string(),
        },
    ))
}

/// Parses a packed-id reference (`@0x...` or `@<decimal>`), rejecting
/// trailing input.
pub(crate) fn parse_id_reference(s: &str) -> Option<ResourceId> {
    all_consuming(alt((hex_id, dec_id)))
        .parse(s)
        .ok()
        .map(|(_, id)| id)
}

/// Parses any textual reference form, rejecting trailing input.
pub(crate) fn parse_reference(s: &str) -> Option<Reference> {
    all_consuming(alt((
        map(alt((hex_id, dec_id)), Reference::Id),
        map(name_reference, Reference::Name),
    )))
    .parse(s)
    .ok()
    .map(|(_, r)| r)
}
