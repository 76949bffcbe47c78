//! HTML rendering for the frontend pages.
//!
//! Every page is the shared header, one content fragment and the footer.
//! All text that comes from users or downstream services goes through
//! [`escape`] before it is written into markup.

use axum::response::Html;

use orecast_core::services::{BucketObjects, DatasetRecord, MetaRecord, SiteBuckets};
use orecast_core::site::{SiteObject, SiteSummary};

/// Page chrome shared by every view.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub title: &'a str,
    pub user: Option<&'a str>,
    pub base: &'a str,
}

/// One row of the sites table.
#[derive(Debug, Clone)]
pub struct SiteRow {
    pub site: SiteSummary,
    pub records: usize,
}

/// Which bucket form to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketAction {
    Create,
    Delete,
}

impl BucketAction {
    fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en"><head><meta charset="utf-8"/><meta name="viewport" content="width=device-width,initial-scale=1"/>
<title>{{TITLE}}</title>
<style>
body{font-family:-apple-system,'Segoe UI',sans-serif;margin:0;color:#1f2933;background:#f5f7fa}
header{display:flex;justify-content:space-between;align-items:center;padding:12px 24px;background:#243b53;color:#fff}
header a{color:#d9e2ec;text-decoration:none;margin-right:16px}
main{max-width:1000px;margin:24px auto;padding:0 24px}
table{border-collapse:collapse;width:100%}
th,td{text-align:left;padding:6px 10px;border-bottom:1px solid #d9e2ec}
.panel{padding:12px 16px;border-radius:6px;margin:12px 0}
.error{background:#ffe3e3;border:1px solid #e12d39}
.success{background:#e3f9e5;border:1px solid #31b237}
.tag{display:inline-block;background:#d9e2ec;border-radius:4px;padding:0 6px;margin-right:4px;font-size:12px}
form label{display:block;margin-top:8px}
</style></head>
<body>
"#;

const PAGE_FOOT: &str = "</main>\n<footer><main><small>OreCast</small></main></footer>\n</body></html>\n";

/// Wrap `content` in the page chrome.
#[must_use]
pub fn render(page: Page<'_>, content: &str) -> Html<String> {
    let base = page.base;
    let mut html = String::with_capacity(PAGE_HEAD.len() + content.len() + 1024);
    html.push_str(&PAGE_HEAD.replace("{{TITLE}}", &escape(page.title)));
    html.push_str("<header><nav>");
    html.push_str(&format!("<a href=\"{base}/\"><b>OreCast</b></a>"));
    html.push_str(&format!("<a href=\"{base}/sites\">Sites</a>"));
    html.push_str(&format!("<a href=\"{base}/datasets\">Datasets</a>"));
    html.push_str(&format!("<a href=\"{base}/site/registration\">Register site</a>"));
    html.push_str("</nav><div>");
    match page.user {
        Some(user) => html.push_str(&format!(
            "{} <a href=\"{base}/logout\">Logout</a>",
            escape(user)
        )),
        None => html.push_str(&format!(
            "<a href=\"{base}/login\">Login</a><a href=\"{base}/registry\">Sign up</a>"
        )),
    }
    html.push_str("</div></header>\n<main>\n");
    html.push_str(content);
    html.push_str(PAGE_FOOT);
    Html(html)
}

/// Escape text for use in HTML content and quoted attributes.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode one path segment for a link.
fn segment(text: &str) -> String {
    escape(&urlencoding::encode(text))
}

#[must_use]
pub fn error_panel(message: &str) -> String {
    format!(
        "<div class=\"panel error\"><h3>ERROR</h3><div>{}</div></div>\n",
        escape(message)
    )
}

#[must_use]
pub fn success_panel(message: &str) -> String {
    format!(
        "<div class=\"panel success\"><h3>SUCCESS</h3><div>{}</div></div>\n",
        escape(message)
    )
}

#[must_use]
pub fn index(user: Option<&str>, base: &str) -> String {
    let mut html = String::from("<h2>OreCast</h2>\n<p>Open Research Computing data platform.</p>\n");
    match user {
        Some(user) => html.push_str(&format!(
            "<p>Welcome back, {}. Browse <a href=\"{base}/sites\">sites</a> or \
             <a href=\"{base}/datasets\">datasets</a>.</p>\n",
            escape(user)
        )),
        None => html.push_str(&format!(
            "<p>Please <a href=\"{base}/login\">login</a> to browse sites and datasets.</p>\n"
        )),
    }
    html
}

#[must_use]
pub fn login_form(base: &str) -> String {
    format!(
        r#"<h2>Login</h2>
<form method="post" action="{base}/login">
<label>User <input name="user" required/></label>
<label>Password <input name="password" type="password" required/></label>
<p><button type="submit">Login</button></p>
</form>
<p>No account yet? <a href="{base}/registry">Sign up</a>.</p>
"#
    )
}

#[must_use]
pub fn registration_form(base: &str, captcha_public_key: Option<&str>) -> String {
    let mut html = format!(
        r#"<h2>User registration</h2>
<form method="post" action="{base}/registry">
<label>Login <input name="login" required/></label>
<label>Password <input name="password" type="password" required/></label>
<label>First name <input name="first_name"/></label>
<label>Last name <input name="last_name"/></label>
<label>Email <input name="email" type="email"/></label>
"#
    );
    match captcha_public_key {
        Some(key) => html.push_str(&format!(
            "<script src=\"https://www.google.com/recaptcha/api.js\" async defer></script>\n\
             <div class=\"g-recaptcha\" data-sitekey=\"{}\"></div>\n",
            escape(key)
        )),
        None => html.push_str("<p><i>Registration is currently disabled.</i></p>\n"),
    }
    html.push_str("<p><button type=\"submit\">Register</button></p>\n</form>\n");
    html
}

#[must_use]
pub fn sites(base: &str, rows: &[SiteRow]) -> String {
    let mut html = String::from(
        "<h2>Sites</h2>\n<table><tr><th>Site</th><th>Description</th><th>URL</th><th>Records</th><th>Storage</th></tr>\n",
    );
    for row in rows {
        let name = &row.site.name;
        html.push_str(&format!(
            "<tr><td><a href=\"{base}/meta/{seg}\">{name}</a></td><td>{desc}</td><td>{url}</td>\
             <td>{records}</td><td><a href=\"{base}/sites/{seg}\">datasets</a> \
             <a href=\"{base}/storage/{seg}\">buckets</a></td></tr>\n",
            seg = segment(name),
            name = escape(name),
            desc = escape(&row.site.description),
            url = escape(&row.site.url),
            records = row.records,
        ));
    }
    html.push_str("</table>\n");
    html
}

#[must_use]
pub fn meta_records(base: &str, site: &SiteSummary, records: &[MetaRecord]) -> String {
    let mut html = format!(
        "<h2>{}</h2>\n<p>{}</p>\n<p>URL: {} (SSL: {})</p>\n",
        escape(&site.name),
        escape(&site.description),
        escape(&site.url),
        if site.use_ssl { "yes" } else { "no" }
    );
    if records.is_empty() {
        html.push_str("<p>No meta-data records.</p>\n");
        return html;
    }
    html.push_str("<table><tr><th>ID</th><th>Bucket</th><th>Description</th><th>Tags</th></tr>\n");
    for record in records {
        html.push_str(&format!(
            "<tr><td><a href=\"{base}/meta/record/{seg}\">{id}</a></td><td>{bucket}</td><td>{desc}</td><td>{tags}</td></tr>\n",
            seg = segment(&record.id),
            id = escape(&record.id),
            bucket = escape(&record.bucket),
            desc = escape(&record.description),
            tags = tags(&record.tags),
        ));
    }
    html.push_str("</table>\n");
    html
}

#[must_use]
pub fn meta_record(base: &str, record: &MetaRecord) -> String {
    format!(
        "<h2>Meta record {id}</h2>\n<table>\n<tr><th>Site</th><td><a href=\"{base}/meta/{site_seg}\">{site}</a></td></tr>\n\
         <tr><th>Bucket</th><td><a href=\"{base}/sites/{site_seg}?bucket={bucket_q}\">{bucket}</a></td></tr>\n\
         <tr><th>Description</th><td>{desc}</td></tr>\n<tr><th>Tags</th><td>{tags}</td></tr>\n</table>\n",
        id = escape(&record.id),
        site_seg = segment(&record.site),
        site = escape(&record.site),
        bucket_q = segment(&record.bucket),
        bucket = escape(&record.bucket),
        desc = escape(&record.description),
        tags = tags(&record.tags),
    )
}

#[must_use]
pub fn datasets(base: &str, records: &[DatasetRecord]) -> String {
    let mut html = String::from(
        "<h2>Datasets</h2>\n<table><tr><th>Dataset</th><th>Site</th><th>Meta ID</th><th>Processing</th><th>Parent</th></tr>\n",
    );
    for r in records {
        html.push_str(&format!(
            "<tr><td><a href=\"{base}/datasets/{seg}\">{ds}</a></td><td>{site}</td>\
             <td><a href=\"{base}/meta/record/{mid_seg}\">{mid}</a></td><td>{proc}</td><td>{parent}</td></tr>\n",
            seg = segment(&r.dataset),
            ds = escape(&r.dataset),
            site = escape(&r.site),
            mid_seg = segment(&r.meta_id),
            mid = escape(&r.meta_id),
            proc = escape(&r.processing),
            parent = escape(&r.parent),
        ));
    }
    html.push_str("</table>\n");
    html
}

#[must_use]
pub fn buckets(base: &str, data: &SiteBuckets) -> String {
    let site = segment(&data.site);
    let mut html = format!(
        "<h2>Storage of {}</h2>\n<p><a href=\"{base}/storage/create?site={site}\">Create bucket</a> \
         <a href=\"{base}/storage/delete?site={site}\">Delete bucket</a></p>\n\
         <table><tr><th>Bucket</th><th>Created</th></tr>\n",
        escape(&data.site)
    );
    for b in &data.buckets {
        html.push_str(&format!(
            "<tr><td><a href=\"{base}/storage/{site}/{seg}\">{name}</a></td><td>{created}</td></tr>\n",
            seg = segment(&b.name),
            name = escape(&b.name),
            created = escape(&b.creation_date),
        ));
    }
    html.push_str("</table>\n");
    html
}

#[must_use]
pub fn objects(data: &BucketObjects) -> String {
    let mut html = format!(
        "<h2>{} / {}</h2>\n<table><tr><th>Object</th><th>Size</th><th>ETag</th><th>Last modified</th></tr>\n",
        escape(&data.site),
        escape(&data.bucket)
    );
    for o in &data.objects {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape(&o.name),
            o.size,
            escape(&o.etag),
            escape(&o.last_modified)
        ));
    }
    html.push_str("</table>\n");
    html
}

#[must_use]
pub fn site_object(bucket: &str, obj: &SiteObject) -> String {
    let heading = if bucket.is_empty() {
        format!("Buckets of {}", escape(&obj.name))
    } else {
        format!("{} / {}", escape(&obj.name), escape(bucket))
    };
    let mut html = format!("<h2>{heading}</h2>\n");
    if obj.datasets.is_empty() {
        html.push_str("<p>Nothing found.</p>\n");
        return html;
    }
    if obj.objects.is_empty() {
        html.push_str("<ul>\n");
        for name in &obj.datasets {
            html.push_str(&format!(
                "<li><a href=\"?bucket={}\">{}</a></li>\n",
                segment(name),
                escape(name)
            ));
        }
        html.push_str("</ul>\n");
    } else {
        html.push_str("<table><tr><th>Object</th><th>Size</th><th>Last modified</th></tr>\n");
        for o in &obj.objects {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&o.name),
                o.size,
                escape(&o.last_modified)
            ));
        }
        html.push_str("</table>\n");
    }
    html
}

#[must_use]
pub fn bucket_form(base: &str, site: &str, action: BucketAction) -> String {
    let verb = action.verb();
    format!(
        r#"<h2>{title} bucket at {site}</h2>
<form method="post" action="{base}/storage/{verb}">
<input type="hidden" name="site" value="{site}"/>
<label>Bucket <input name="bucket" required/></label>
<p><button type="submit">{title}</button></p>
</form>
"#,
        title = if action == BucketAction::Create { "Create" } else { "Delete" },
        site = escape(site),
    )
}

#[must_use]
pub fn site_registration_form(base: &str) -> String {
    format!(
        r#"<h2>Site registration</h2>
<form method="post" action="{base}/site/registration">
<label>Name <input name="name" required/></label>
<label>URL <input name="url"/></label>
<label>Storage endpoint <input name="endpoint" required/></label>
<label>Access key <input name="access_key" required/></label>
<label>Access secret <input name="access_secret" type="password" required/></label>
<label>Use SSL <input name="use_ssl" type="checkbox" value="true"/></label>
<label>Description <input name="description"/></label>
<p><button type="submit">Register</button></p>
</form>
"#
    )
}

fn tags(tags: &[String]) -> String {
    tags.iter()
        .map(|t| format!("<span class=\"tag\">{}</span>", escape(t)))
        .collect()
}
