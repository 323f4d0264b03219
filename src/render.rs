//! HTML pages. Templates are compiled in and autoescaped (`.html` names), so
//! record fields and claims are always rendered as text.

use lazy_static::lazy_static;
use serde::Serialize;
use tera::{Context, Tera};

use crate::store::UserRecord;

lazy_static! {
    static ref TERA: Tera = {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            ("index.html", include_str!("../templates/index.html")),
            ("users.html", include_str!("../templates/users.html")),
            ("env.html", include_str!("../templates/env.html")),
        ])
        .expect("built-in templates are valid");
        tera
    };
}

#[derive(Debug, Serialize)]
pub struct EnvEntry {
    pub name: &'static str,
    pub value: String,
}

/// Shared by the `/` and `/users` pages.
#[derive(Debug, Serialize)]
pub struct ListPage<'a> {
    pub status: &'a str,
    pub db_available: bool,
    pub users: &'a [UserRecord],
    pub signed_in_as: Option<&'a str>,
}

pub fn index(page: &ListPage<'_>) -> Result<String, tera::Error> {
    TERA.render("index.html", &Context::from_serialize(page)?)
}

pub fn users(page: &ListPage<'_>) -> Result<String, tera::Error> {
    TERA.render("users.html", &Context::from_serialize(page)?)
}

pub fn env(entries: &[EnvEntry], signed_in_as: Option<&str>) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("entries", entries);
    context.insert("signed_in_as", &signed_in_as);
    TERA.render("env.html", &context)
}
