use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Runtime type identifier stored next to every value.
///
/// The textual form (`long`, `string`, `list<SampleItem>`, `map<uuid,SampleItem>`, ...)
/// is what lands in envelopes and `K.i.j.type` entries. Parsing also accepts the
/// JVM-style names older stores were written with, e.g. `java.lang.Long` or
/// `java.util.concurrent.ConcurrentHashMap<java.util.UUID, Item>`.
///
/// Collection element types are optional: an empty collection carries no element
/// information.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Bool,
    Int,
    Long,
    Double,
    Text,
    Uuid,
    Record(String),
    List(Option<Box<TypeDesc>>),
    Set(Option<Box<TypeDesc>>),
    Map(Option<(Box<TypeDesc>, Box<TypeDesc>)>),
}

impl TypeDesc {
    pub fn record(name: impl Into<String>) -> Self {
        TypeDesc::Record(name.into())
    }

    pub fn list(element: TypeDesc) -> Self {
        TypeDesc::List(Some(Box::new(element)))
    }

    pub fn set(element: TypeDesc) -> Self {
        TypeDesc::Set(Some(Box::new(element)))
    }

    pub fn map(key: TypeDesc, value: TypeDesc) -> Self {
        TypeDesc::Map(Some((Box::new(key), Box::new(value))))
    }

    /// The descriptor covering both `self` and `other`, or `None` when they
    /// disagree. An untyped (empty) collection is covered by any typed one of the
    /// same kind.
    pub fn unify(&self, other: &TypeDesc) -> Option<TypeDesc> {
        match (self, other) {
            (TypeDesc::List(a), TypeDesc::List(b)) => unify_element(a, b).map(TypeDesc::List),
            (TypeDesc::Set(a), TypeDesc::Set(b)) => unify_element(a, b).map(TypeDesc::Set),
            (TypeDesc::Map(a), TypeDesc::Map(b)) => match (a, b) {
                (None, entry) | (entry, None) => Some(TypeDesc::Map(entry.clone())),
                (Some((ak, av)), Some((bk, bv))) => Some(TypeDesc::map(ak.unify(bk)?, av.unify(bv)?)),
            },
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }

    /// Every record name referenced by this descriptor, outermost first.
    pub fn record_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_records(&mut names);
        names
    }

    fn collect_records<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeDesc::Record(name) => out.push(name),
            TypeDesc::List(Some(inner)) | TypeDesc::Set(Some(inner)) => inner.collect_records(out),
            TypeDesc::Map(Some((k, v))) => {
                k.collect_records(out);
                v.collect_records(out);
            }
            _ => {}
        }
    }
}

fn unify_element(a: &Option<Box<TypeDesc>>, b: &Option<Box<TypeDesc>>) -> Option<Option<Box<TypeDesc>>> {
    match (a, b) {
        (None, element) | (element, None) => Some(element.clone()),
        (Some(a), Some(b)) => a.unify(b).map(|u| Some(Box::new(u))),
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::Int => f.write_str("int"),
            TypeDesc::Long => f.write_str("long"),
            TypeDesc::Double => f.write_str("double"),
            TypeDesc::Text => f.write_str("string"),
            TypeDesc::Uuid => f.write_str("uuid"),
            TypeDesc::Record(name) => f.write_str(name),
            TypeDesc::List(None) => f.write_str("list"),
            TypeDesc::List(Some(e)) => write!(f, "list<{}>", e),
            TypeDesc::Set(None) => f.write_str("set"),
            TypeDesc::Set(Some(e)) => write!(f, "set<{}>", e),
            TypeDesc::Map(None) => f.write_str("map"),
            TypeDesc::Map(Some((k, v))) => write!(f, "map<{},{}>", k, v),
        }
    }
}

impl FromStr for TypeDesc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = DescParser { input: s, pos: 0 };
        let desc = parser.desc()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(Error::UnknownType(format!("trailing input in '{}'", s)));
        }
        Ok(desc)
    }
}

fn scalar(name: &str) -> Option<TypeDesc> {
    let desc = match name {
        "bool" | "boolean" | "java.lang.Boolean" | "kotlin.Boolean" => TypeDesc::Bool,
        "int" | "integer" | "java.lang.Integer" | "kotlin.Int" | "kotlin.Integer" => TypeDesc::Int,
        "long" | "java.lang.Long" | "kotlin.Long" => TypeDesc::Long,
        "double" | "float" | "java.lang.Double" | "kotlin.Double" | "java.lang.Float" | "kotlin.Float" => {
            TypeDesc::Double
        }
        "string" | "String" | "java.lang.String" | "kotlin.String" => TypeDesc::Text,
        "uuid" | "java.util.UUID" => TypeDesc::Uuid,
        _ => return None,
    };
    Some(desc)
}

#[derive(Clone, Copy)]
enum Family {
    List,
    Set,
    Map,
}

fn family(name: &str) -> Option<Family> {
    match name {
        "list"
        | "java.util.List"
        | "java.util.ArrayList"
        | "java.util.LinkedList"
        | "java.util.concurrent.CopyOnWriteArrayList"
        | "kotlin.collections.List"
        | "kotlin.collections.MutableList" => Some(Family::List),
        "set"
        | "java.util.Set"
        | "java.util.HashSet"
        | "java.util.LinkedHashSet"
        | "kotlin.collections.Set"
        | "kotlin.collections.MutableSet" => Some(Family::Set),
        "map"
        | "java.util.Map"
        | "java.util.HashMap"
        | "java.util.LinkedHashMap"
        | "java.util.concurrent.ConcurrentHashMap"
        | "kotlin.collections.Map"
        | "kotlin.collections.MutableMap" => Some(Family::Map),
        _ => None,
    }
}

struct DescParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> DescParser<'a> {
    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> &'a str {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '<' | '>' | ',') || c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn desc(&mut self) -> Result<TypeDesc> {
        let name = self.ident();
        if name.is_empty() {
            return Err(Error::UnknownType(format!("empty type name in '{}'", self.input)));
        }

        if !self.eat('<') {
            if let Some(desc) = scalar(name) {
                return Ok(desc);
            }
            return Ok(match family(name) {
                Some(Family::List) => TypeDesc::List(None),
                Some(Family::Set) => TypeDesc::Set(None),
                Some(Family::Map) => TypeDesc::Map(None),
                None => TypeDesc::Record(name.to_string()),
            });
        }

        let mut args = vec![self.desc()?];
        while self.eat(',') {
            args.push(self.desc()?);
        }
        if !self.eat('>') {
            return Err(Error::UnknownType(format!("unclosed type arguments in '{}'", self.input)));
        }

        let family = family(name)
            .ok_or_else(|| Error::UnknownType(format!("'{}' does not take type arguments", name)))?;
        let mut args = args.into_iter();
        match (family, args.next(), args.next(), args.next()) {
            (Family::List, Some(e), None, None) => Ok(TypeDesc::list(e)),
            (Family::Set, Some(e), None, None) => Ok(TypeDesc::set(e)),
            (Family::Map, Some(k), Some(v), None) => Ok(TypeDesc::map(k, v)),
            _ => Err(Error::UnknownType(format!("wrong number of type arguments for '{}'", name))),
        }
    }
}
