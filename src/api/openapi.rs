use super::handlers::{
    auth, courses, enrollments, feedback, health, ideas, notifications, projects, proposals, users,
};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec. Handlers sharing a path must
/// be registered in the same `routes!` call.
/// Routes added outside (like `/` or `OPTIONS /health`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::csrf::csrf_token))
        .routes(routes!(users::list_users))
        .routes(routes!(users::get_user, users::update_user, users::delete_user))
        .routes(routes!(ideas::create_idea, ideas::list_ideas))
        .routes(routes!(ideas::get_idea, ideas::update_idea, ideas::delete_idea))
        .routes(routes!(projects::create_project, projects::list_projects))
        .routes(routes!(
            projects::get_project,
            projects::update_project,
            projects::delete_project
        ))
        .routes(routes!(courses::create_course, courses::list_courses))
        .routes(routes!(
            courses::get_course,
            courses::update_course,
            courses::delete_course
        ))
        .routes(routes!(proposals::create_proposal, proposals::list_proposals))
        .routes(routes!(
            proposals::get_proposal,
            proposals::update_proposal,
            proposals::delete_proposal
        ))
        .routes(routes!(feedback::create_feedback, feedback::list_feedback))
        .routes(routes!(
            feedback::get_feedback,
            feedback::update_feedback,
            feedback::delete_feedback
        ))
        .routes(routes!(
            notifications::create_notification,
            notifications::list_notifications
        ))
        .routes(routes!(
            notifications::get_notification,
            notifications::update_notification,
            notifications::delete_notification
        ))
        .routes(routes!(
            enrollments::create_enrollment,
            enrollments::list_enrollments
        ))
        .routes(routes!(
            enrollments::get_enrollment,
            enrollments::update_enrollment,
            enrollments::delete_enrollment
        ));

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    let mut openapi = OpenApiBuilder::new().info(info).build();

    let mut conecta_tag = Tag::new("conecta");
    conecta_tag.description = Some("Campus and community project collaboration API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, login, sessions and CSRF".to_string());

    openapi.tags = Some(vec![conecta_tag, auth_tag]);

    openapi
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Conecta"));
            assert_eq!(contact.email.as_deref(), Some("team@conecta.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "conecta"));
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(spec.paths.paths.contains_key("/api/users/login"));
        assert!(spec.paths.paths.contains_key("/api/ideas/{id}"));
        assert!(spec.paths.paths.contains_key("/api/project-students/{id}"));
        assert!(spec.paths.paths.contains_key("/api/csrf-token"));
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team Conecta <team@conecta.dev>"),
            (Some("Team Conecta"), Some("team@conecta.dev"))
        );
        assert_eq!(parse_author("Solo Dev"), (Some("Solo Dev"), None));
        assert_eq!(parse_author("<only@email>"), (None, Some("only@email")));
    }
}
