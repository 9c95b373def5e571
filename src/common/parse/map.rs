// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::collections::HashMap;

use crate::common::parse::quoted;

use nom::{
    bytes::complete::tag,
    character::complete::{multispace0, space0},
    combinator::map,
    multi::many0,
    sequence::{delimited, preceded, separated_pair, terminated},
};

// "name" "value"
pub fn entity_attribute(input: &str) -> nom::IResult<&str, (&str, &str)> {
    preceded(multispace0, separated_pair(quoted, space0, quoted))(input)
}

// {
// "name1" "value1"
// "name2" "value2"
// "name3" "value3"
// }
pub fn entity(input: &str) -> nom::IResult<&str, HashMap<&str, &str>> {
    delimited(
        preceded(multispace0, tag("{")),
        map(many0(entity_attribute), |attrs| attrs.into_iter().collect()),
        preceded(multispace0, tag("}")),
    )(input)
}

pub fn entities(input: &str) -> nom::IResult<&str, Vec<HashMap<&str, &str>>> {
    terminated(many0(entity), multispace0)(input)
}

/// Returns the value of `key` on the first entity in `text`, if both exist.
///
/// Trailing zero bytes (the entity lump is stored as a C string) are ignored.
pub fn first_entity_value(text: &str, key: &str) -> Option<String> {
    let text = text.trim_end_matches('\0');
    match entity(text) {
        Ok((_, attrs)) => attrs.get(key).map(|v| v.to_string()),
        Err(e) => {
            debug!("Failed to parse first entity: {:?}", e);
            None
        }
    }
}

/// Splits a `wad` key value into archive names.
///
/// Entries are separated by `;`. Each entry loses its directory and extension and is folded to
/// lower case; empty entries are dropped.
pub fn archive_names(wad_list: &str) -> Vec<String> {
    wad_list
        .split(';')
        .map(str::trim)
        .filter_map(|path| {
            let file = path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path);
            let stem = match file.rfind('.') {
                Some(dot) => &file[..dot],
                None => file,
            };

            if stem.is_empty() {
                None
            } else {
                Some(stem.to_ascii_lowercase())
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_entities() {
        let text = "{\n\"classname\" \"worldspawn\"\n\"wad\" \"a.wad\"\n}\n\
                    {\n\"classname\" \"light\"\n\"origin\" \"0 0 64\"\n}\n\0";
        let (rest, ents) = entities(text.trim_end_matches('\0')).unwrap();
        assert_eq!(rest, "");
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].get("classname"), Some(&"worldspawn"));
        assert_eq!(ents[1].get("origin"), Some(&"0 0 64"));
    }

    #[test]
    fn test_first_entity_value() {
        let text = "{\r\n\"wad\" \"archive1.wad;archive2.wad\"\r\n\"classname\" \"worldspawn\"\r\n}\0";
        assert_eq!(
            first_entity_value(text, "wad"),
            Some(String::from("archive1.wad;archive2.wad"))
        );
        assert_eq!(first_entity_value(text, "message"), None);
        assert_eq!(first_entity_value("", "wad"), None);
    }

    #[test]
    fn test_archive_names() {
        assert_eq!(
            archive_names("archive1.wad;archive2.wad"),
            vec!["archive1", "archive2"]
        );
        assert_eq!(
            archive_names("\\half-life\\valve\\Halflife.WAD;;/maps/x/DECALS.wad;"),
            vec!["halflife", "decals"]
        );
        assert!(archive_names("").is_empty());
    }
}
