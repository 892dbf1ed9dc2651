//! `%s` placeholders in equation and expression templates.
//!
//! `%s` is replaced by the next region name, `%%` by a literal `%`.
//! The number of placeholders must match the number of regions exactly.

use crate::error::{Error, Result};

use indexmap::IndexMap;

/// Number of `%s` placeholders, or `None` on a malformed `%` sequence.
fn count_placeholders(template: &str) -> Option<usize> {
  let mut count = 0;
  let mut chars = template.chars();
  while let Some(c) = chars.next() {
    if c == '%' {
      match chars.next() {
        Some('s') => count += 1,
        Some('%') => {}
        _ => return None,
      }
    }
  }
  Some(count)
}

pub fn substitute(requirement: &str, template: &str, regions: &[String]) -> Result<String> {
  let expected = count_placeholders(template).ok_or_else(|| {
    Error::config(
      requirement,
      format!("malformed placeholder in template `{template}`"),
    )
  })?;
  if expected != regions.len() {
    return Err(Error::Template {
      requirement: requirement.to_string(),
      template: template.to_string(),
      expected,
      found: regions.len(),
    });
  }

  let mut out = String::with_capacity(template.len());
  let mut regions = regions.iter();
  let mut chars = template.chars();
  while let Some(c) = chars.next() {
    if c != '%' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('s') => {
        if let Some(region) = regions.next() {
          out.push_str(region);
        }
      }
      _ => out.push('%'),
    }
  }
  Ok(out)
}

pub fn substitute_all(
  requirement: &str,
  templates: &IndexMap<String, String>,
  regions: &[String],
) -> Result<IndexMap<String, String>> {
  templates
    .iter()
    .map(|(name, template)| -> Result<(String, String)> {
      Ok((name.clone(), substitute(requirement, template, regions)?))
    })
    .collect()
}
