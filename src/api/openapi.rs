//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{
    accounts, admin, authors, books, genres, health, index, instances, languages,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Catalog API",
        version = "0.4.0",
        description = "Books, authors, copies and loans of a local library",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Catalog home
        index::root,
        index::index,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::edit_book,
        books::update_book,
        books::confirm_delete_book,
        books::delete_book,
        books::upload_cover,
        // Authors
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        authors::edit_author,
        authors::update_author,
        authors::confirm_delete_author,
        authors::delete_author,
        // Genres and languages
        genres::list_genres,
        genres::create_genre,
        languages::list_languages,
        languages::create_language,
        // Copies and loans
        instances::create_instance,
        instances::confirm_delete_instance,
        instances::delete_instance,
        instances::my_books,
        instances::loaned_books,
        instances::borrower_books,
        instances::renew_form,
        instances::renew,
        instances::update_checkout,
        // Accounts
        accounts::signup,
        accounts::login_page,
        accounts::login,
        accounts::logout,
        accounts::me,
        accounts::send_confirmation,
        accounts::confirm_email,
        accounts::request_password_reset,
        accounts::reset_password,
        accounts::change_password,
        // Admin
        admin::list_users,
        admin::update_account_type,
        admin::verify_email,
        admin::update_active,
        admin::delete_user,
    ),
    components(
        schemas(
            // Catalog
            index::IndexResponse,
            crate::services::catalog::CatalogCounts,
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::BookDetail,
            crate::models::book::BookEdit,
            crate::models::book::BookForm,
            crate::models::book::BookDeleteInfo,
            crate::models::book::CoverImage,
            crate::models::author::Author,
            crate::models::author::AuthorDetail,
            crate::models::author::AuthorForm,
            crate::models::author::AuthorDeleteInfo,
            crate::models::genre::Genre,
            crate::models::genre::GenreForm,
            crate::models::language::Language,
            crate::models::language::LanguageForm,
            // Copies and loans
            crate::models::book_instance::BookInstance,
            crate::models::book_instance::InstanceSummary,
            crate::models::book_instance::CreateInstance,
            crate::models::book_instance::RenewForm,
            crate::models::book_instance::RenewProposal,
            crate::models::book_instance::CheckoutAction,
            crate::models::loan_state::LoanStatus,
            // Accounts
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::AccountType,
            crate::models::user::SignupRequest,
            crate::models::user::LoginRequest,
            crate::models::user::ChangePasswordRequest,
            crate::models::user::PasswordResetRequest,
            crate::models::user::PasswordResetConfirm,
            crate::models::user::UpdateAccountType,
            crate::models::user::UpdateActive,
            accounts::LoginPage,
            accounts::SessionResponse,
            accounts::MessageResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::error::FieldErrors,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "catalog", description = "Catalog home page"),
        (name = "books", description = "Book management"),
        (name = "authors", description = "Author management"),
        (name = "genres", description = "Genres"),
        (name = "languages", description = "Languages"),
        (name = "instances", description = "Physical copies of books"),
        (name = "loans", description = "Checkout, return and renewal"),
        (name = "accounts", description = "Signup, login, email confirmation and passwords"),
        (name = "admin", description = "User administration")
    )
)]
pub struct ApiDoc;

/// Declares the `bearer_auth` scheme the secured paths refer to
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
