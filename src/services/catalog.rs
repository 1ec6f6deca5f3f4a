//! Catalog management service: books, authors, genres, languages

use std::sync::Arc;

use image::GenericImageView;
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{AuthorDeleteInfo, AuthorDetail, AuthorForm},
        book::{
            BookDeleteInfo, BookDetail, BookEdit, BookForm, CoverImage, COVER_UPLOAD_TO, MAX_COVER_SIZE,
        },
        genre::GenreForm,
        language::LanguageForm,
        loan_state::LoanStatus,
        pagination::{Page, PageNumber, Pagination, AUTHORS_PER_PAGE, BOOKS_PER_PAGE},
        renewal::{default_renewal_date, Clock},
        Author, Book, BookShort, Genre, Language,
    },
    repository::Repository,
};

use super::storage::Store;

/// Home page counters
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CatalogCounts {
    pub num_books: i64,
    pub num_instances: i64,
    pub num_instances_available: i64,
    pub num_authors: i64,
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(repository: Repository, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            store,
            clock,
        }
    }

    pub async fn counts(&self) -> AppResult<CatalogCounts> {
        Ok(CatalogCounts {
            num_books: self.repository.books.count().await?,
            num_instances: self.repository.instances.count().await?,
            num_instances_available: self
                .repository
                .instances
                .count_with_status(LoanStatus::Available)
                .await?,
            num_authors: self.repository.authors.count().await?,
        })
    }

    // Books

    pub async fn list_books(&self, page: Option<PageNumber>) -> AppResult<Page<BookShort>> {
        let total = self.repository.books.count().await?;
        let pagination = Pagination::resolve(page, BOOKS_PER_PAGE, total)?;
        let books = self.repository.books.list(&pagination).await?;
        Ok(pagination.wrap(books))
    }

    /// Get book with author, language, genres and copies
    pub async fn get_book(&self, id: i32) -> AppResult<BookDetail> {
        let book = self.repository.books.get_by_id(id).await?;
        let today = self.clock.today();

        let author = match book.author_id {
            Some(author_id) => self.repository.authors.find(author_id).await?,
            None => None,
        };
        let language = match book.language_id {
            Some(language_id) => self.repository.languages.find(language_id).await?,
            None => None,
        };
        let genres = self.repository.genres.list_for_book(id).await?;
        let instances = self
            .repository
            .instances
            .list_for_book(id)
            .await?
            .into_iter()
            .map(|i| i.with_today(today))
            .collect();

        Ok(BookDetail {
            cover_image: self.cover_of(&book),
            id: book.id,
            title: book.title,
            summary: book.summary,
            isbn: book.isbn,
            author,
            language,
            genres,
            instances,
            checkout_due_date: default_renewal_date(today),
        })
    }

    fn cover_of(&self, book: &Book) -> Option<CoverImage> {
        book.cover_image.as_ref().map(|name| CoverImage {
            url: self.store.url(name),
            width: book.cover_image_width,
            height: book.cover_image_height,
        })
    }

    pub async fn create_book(&self, form: BookForm) -> AppResult<Book> {
        form.clean()?;
        let book = self.repository.books.create(&form).await?;
        tracing::info!("Book {} created: {}", book.id, book.title);
        Ok(book)
    }

    pub async fn edit_book(&self, id: i32) -> AppResult<BookEdit> {
        let book = self.repository.books.get_by_id(id).await?;
        let genre_ids = self
            .repository
            .genres
            .list_for_book(id)
            .await?
            .into_iter()
            .map(|g| g.id)
            .collect();
        Ok(BookEdit { book, genre_ids })
    }

    pub async fn update_book(&self, id: i32, form: BookForm) -> AppResult<Book> {
        form.clean()?;
        self.repository.books.update(id, &form).await
    }

    pub async fn book_delete_info(&self, id: i32) -> AppResult<BookDeleteInfo> {
        let book = self.repository.books.get_by_id(id).await?;
        let instances = self.repository.instances.list_for_book(id).await?;
        Ok(BookDeleteInfo {
            id: book.id,
            title: book.title,
            instances,
        })
    }

    /// Delete a book, then its cover file
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let cover = self.repository.books.delete(id).await?;
        tracing::info!("Book {} deleted", id);

        if let Some(name) = cover {
            if let Err(e) = self.store.delete(&name).await {
                tracing::warn!("Orphaned cover image {}: {}", name, e);
            }
        }
        Ok(())
    }

    /// Store a new cover image for a book, replacing the previous one
    pub async fn upload_cover(
        &self,
        id: i32,
        filename: &str,
        content: Vec<u8>,
    ) -> AppResult<CoverImage> {
        let (width, height, content_type) = inspect_cover(&content)?;

        // Fail before writing anything if the book is gone
        self.repository.books.get_by_id(id).await?;

        let name = self.store.generate_filename(COVER_UPLOAD_TO, filename);
        self.store.save(&name, content, content_type).await?;

        let previous = match self
            .repository
            .books
            .set_cover(id, &name, width as i32, height as i32)
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&name).await {
                    tracing::warn!("Orphaned cover image {}: {}", name, cleanup);
                }
                return Err(e);
            }
        };

        if let Some(previous) = previous.filter(|p| *p != name) {
            if let Err(e) = self.store.delete(&previous).await {
                tracing::warn!("Orphaned cover image {}: {}", previous, e);
            }
        }

        tracing::info!("Cover of book {} stored as {}", id, name);

        Ok(CoverImage {
            url: self.store.url(&name),
            width: Some(width as i32),
            height: Some(height as i32),
        })
    }

    // Authors

    pub async fn list_authors(&self, page: Option<PageNumber>) -> AppResult<Page<Author>> {
        let total = self.repository.authors.count().await?;
        let pagination = Pagination::resolve(page, AUTHORS_PER_PAGE, total)?;
        let authors = self.repository.authors.list(&pagination).await?;
        Ok(pagination.wrap(authors))
    }

    pub async fn get_author(&self, id: i32) -> AppResult<AuthorDetail> {
        let author = self.repository.authors.get_by_id(id).await?;
        let books = self.repository.books.list_by_author(id).await?;
        Ok(AuthorDetail {
            display_name: author.display_name(),
            author,
            books,
        })
    }

    pub async fn create_author(&self, form: AuthorForm) -> AppResult<Author> {
        form.clean()?;
        let author = self.repository.authors.create(&form).await?;
        tracing::info!("Author {} created: {}", author.id, author.display_name());
        Ok(author)
    }

    pub async fn update_author(&self, id: i32, form: AuthorForm) -> AppResult<Author> {
        form.clean()?;
        self.repository.authors.update(id, &form).await
    }

    pub async fn author_delete_info(&self, id: i32) -> AppResult<AuthorDeleteInfo> {
        let author = self.repository.authors.get_by_id(id).await?;
        let nb_books = self.repository.authors.count_books(id).await?;
        Ok(AuthorDeleteInfo { author, nb_books })
    }

    pub async fn delete_author(&self, id: i32) -> AppResult<()> {
        self.repository.authors.delete(id).await?;
        tracing::info!("Author {} deleted", id);
        Ok(())
    }

    // Genres and languages

    pub async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        self.repository.genres.list().await
    }

    pub async fn create_genre(&self, form: GenreForm) -> AppResult<Genre> {
        form.validate()
            .map_err(|e| AppError::InvalidForm(e.into()))?;
        self.repository.genres.create(&form).await
    }

    pub async fn list_languages(&self) -> AppResult<Vec<Language>> {
        self.repository.languages.list().await
    }

    pub async fn create_language(&self, form: LanguageForm) -> AppResult<Language> {
        form.validate()
            .map_err(|e| AppError::InvalidForm(e.into()))?;
        self.repository.languages.create(&form).await
    }
}

/// Size limit and decoding check for an uploaded cover.
///
/// Returns width, height and MIME type.
pub fn inspect_cover(content: &[u8]) -> AppResult<(u32, u32, &'static str)> {
    if content.len() > MAX_COVER_SIZE {
        return Err(AppError::InvalidForm(crate::error::FieldErrors::single(
            "cover_image",
            "Image file too large: must be less than 1MB",
        )));
    }

    let invalid = || {
        AppError::InvalidForm(crate::error::FieldErrors::single(
            "cover_image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        ))
    };

    let format = image::guess_format(content).map_err(|_| invalid())?;
    let decoded = image::load_from_memory_with_format(content, format).map_err(|_| invalid())?;
    let (width, height) = decoded.dimensions();

    Ok((width, height, format.to_mime_type()))
}
