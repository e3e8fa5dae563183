// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The catalog's key schema: pure functions mapping (service, instance,
//! rule) triples to and from catalog keys under a fixed root.
//!
//! Ported from the original's `keyspace.go`/`service_parser.go`, which used
//! anchored regexes; here the same anchoring is expressed with
//! `strip_prefix`/`split` instead, matching the hand-rolled scanning style
//! this workspace otherwise uses for lexing (c.f. `sql-parser`'s lexer).

/// The fixed root prefix under which the whole catalog lives.
pub const ROOT: &str = "/weave-flux/";

const SERVICE: &str = "service/";
const HOST: &str = "host/";
const DETAILS: &str = "details";
const INSTANCE: &str = "instance/";
const GROUPSPEC: &str = "groupspec/";

/// The result of parsing a raw catalog key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedKey {
    /// The catalog root itself (`/weave-flux/`).
    Root,
    /// `service/<svc>` — the root of one service's subtree.
    ServiceRoot(String),
    /// `service/<svc>/details`.
    ServiceDetails(String),
    /// `service/<svc>/instance/<inst>`.
    Instance(String, String),
    /// `service/<svc>/groupspec/<rule>`.
    Rule(String, String),
    /// `host/<identity>`.
    Host(String),
    /// Anything else: a key outside the schema, or one that violates an
    /// anchoring rule (trailing slash, extra segments, empty name).
    Unknown,
}

/// `service/<svc>`.
pub fn service_root_key(service: &str) -> String {
    format!("{ROOT}{SERVICE}{service}")
}

/// `service/<svc>/details`.
pub fn service_details_key(service: &str) -> String {
    format!("{ROOT}{SERVICE}{service}/{DETAILS}")
}

/// `service/<svc>/instance/<inst>`.
pub fn instance_key(service: &str, instance: &str) -> String {
    format!("{ROOT}{SERVICE}{service}/{INSTANCE}{instance}")
}

/// `service/<svc>/groupspec/<rule>`.
pub fn rule_key(service: &str, rule: &str) -> String {
    format!("{ROOT}{SERVICE}{service}/{GROUPSPEC}{rule}")
}

/// `host/<identity>`.
pub fn host_key(identity: &str) -> String {
    format!("{ROOT}{HOST}{identity}")
}

/// The lexicographically-smallest key that is *not* prefixed by `key`, for
/// use as a `range_end` in a prefix scan (`Range(key, key.upper_bound())`
/// per the backend contract). Returns `None` if `key` is empty or is all
/// `0xff` bytes, in which case there is no finite upper bound and a scan to
/// the end of the keyspace is required instead.
pub fn upper_bound(key: &str) -> Option<String> {
    let mut bytes = key.as_bytes().to_vec();
    while let Some(&last) = bytes.last() {
        if last < 0xff {
            *bytes.last_mut().expect("checked by while let") += 1;
            return Some(
                String::from_utf8(bytes)
                    .expect("incrementing an ASCII tail byte stays valid UTF-8"),
            );
        }
        bytes.pop();
    }
    None
}

/// A non-empty name must not contain `/`.
fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

/// Parses a raw key into its tagged form. Parsing is anchored: trailing
/// slashes and keys with extra segments past an allowed form are
/// `ParsedKey::Unknown`, never treated as a prefix match.
pub fn parse_key(key: &str) -> ParsedKey {
    let Some(rest) = key.strip_prefix(ROOT) else {
        return ParsedKey::Unknown;
    };
    if rest.is_empty() {
        return ParsedKey::Root;
    }
    if let Some(identity) = rest.strip_prefix(HOST) {
        return if valid_name(identity) {
            ParsedKey::Host(identity.to_string())
        } else {
            ParsedKey::Unknown
        };
    }
    let Some(rest) = rest.strip_prefix(SERVICE) else {
        return ParsedKey::Unknown;
    };
    let Some((service, tail)) = rest.split_once('/') else {
        return if valid_name(rest) {
            ParsedKey::ServiceRoot(rest.to_string())
        } else {
            ParsedKey::Unknown
        };
    };
    if !valid_name(service) {
        return ParsedKey::Unknown;
    }
    if tail == DETAILS {
        return ParsedKey::ServiceDetails(service.to_string());
    }
    if let Some(instance) = tail.strip_prefix(INSTANCE) {
        return if valid_name(instance) {
            ParsedKey::Instance(service.to_string(), instance.to_string())
        } else {
            ParsedKey::Unknown
        };
    }
    if let Some(rule) = tail.strip_prefix(GROUPSPEC) {
        return if valid_name(rule) {
            ParsedKey::Rule(service.to_string(), rule.to_string())
        } else {
            ParsedKey::Unknown
        };
    }
    ParsedKey::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_key_form() {
        assert_eq!(parse_key(ROOT), ParsedKey::Root);
        assert_eq!(
            parse_key(&service_root_key("web")),
            ParsedKey::ServiceRoot("web".into())
        );
        assert_eq!(
            parse_key(&service_details_key("web")),
            ParsedKey::ServiceDetails("web".into())
        );
        assert_eq!(
            parse_key(&instance_key("web", "i1")),
            ParsedKey::Instance("web".into(), "i1".into())
        );
        assert_eq!(
            parse_key(&rule_key("web", "r1")),
            ParsedKey::Rule("web".into(), "r1".into())
        );
        assert_eq!(parse_key(&host_key("h1")), ParsedKey::Host("h1".into()));
    }

    #[test]
    fn rejects_trailing_slash_and_extra_segments() {
        assert_eq!(parse_key("/weave-flux/service/web/"), ParsedKey::Unknown);
        assert_eq!(
            parse_key("/weave-flux/service/web/details/extra"),
            ParsedKey::Unknown
        );
        assert_eq!(
            parse_key("/weave-flux/service/web/instance/i1/extra"),
            ParsedKey::Unknown
        );
        assert_eq!(parse_key("/weave-flux/service/"), ParsedKey::Unknown);
        assert_eq!(parse_key("/weave-flux/bogus/x"), ParsedKey::Unknown);
        assert_eq!(parse_key("not-even-rooted"), ParsedKey::Unknown);
    }

    #[test]
    fn upper_bound_increments_last_byte() {
        assert_eq!(upper_bound("abc").as_deref(), Some("abd"));
        assert_eq!(upper_bound("").as_deref(), None);
    }
}
