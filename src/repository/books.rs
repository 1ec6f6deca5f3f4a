//! Books repository for database operations

use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{book::BookForm, pagination::Pagination, Book, BookShort},
};

use super::{map_delete_error, map_write_error};

const BOOK_SHORT_COLUMNS: &str = r#"
    b.id, b.title, b.isbn, b.author_id,
    CASE WHEN a.id IS NULL THEN NULL ELSE a.last_name || ', ' || a.first_name END AS author_name
"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// One page of books ordered by title
    pub async fn list(&self, pagination: &Pagination) -> AppResult<Vec<BookShort>> {
        let query = format!(
            r#"
            SELECT {BOOK_SHORT_COLUMNS}
            FROM books b
            LEFT JOIN authors a ON a.id = b.author_id
            ORDER BY b.title, b.id
            LIMIT $1 OFFSET $2
            "#
        );

        let books = sqlx::query_as::<_, BookShort>(&query)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(books)
    }

    /// Books attributed to an author
    pub async fn list_by_author(&self, author_id: i32) -> AppResult<Vec<BookShort>> {
        let query = format!(
            r#"
            SELECT {BOOK_SHORT_COLUMNS}
            FROM books b
            LEFT JOIN authors a ON a.id = b.author_id
            WHERE b.author_id = $1
            ORDER BY b.title, b.id
            "#
        );

        let books = sqlx::query_as::<_, BookShort>(&query)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(books)
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Create a book and attach its genres
    pub async fn create(&self, form: &BookForm) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, summary, isbn, author_id, language_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&form.title)
        .bind(&form.summary)
        .bind(&form.isbn)
        .bind(form.author_id)
        .bind(form.language_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        Self::replace_genres(&mut tx, book.id, &form.genre_ids).await?;
        tx.commit().await?;

        Ok(book)
    }

    /// Update a book and replace its genres
    pub async fn update(&self, id: i32, form: &BookForm) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET title = $2, summary = $3, isbn = $4, author_id = $5, language_id = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&form.title)
        .bind(&form.summary)
        .bind(&form.isbn)
        .bind(form.author_id)
        .bind(form.language_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_write_error)?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        Self::replace_genres(&mut tx, id, &form.genre_ids).await?;
        tx.commit().await?;

        Ok(book)
    }

    async fn replace_genres(
        tx: &mut Transaction<'_, Postgres>,
        book_id: i32,
        genre_ids: &[i32],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM book_genres WHERE book_id = $1")
            .bind(book_id)
            .execute(&mut **tx)
            .await?;

        if !genre_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO book_genres (book_id, genre_id)
                SELECT $1, UNNEST($2::INT[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(book_id)
            .bind(genre_ids)
            .execute(&mut **tx)
            .await
            .map_err(map_write_error)?;
        }

        Ok(())
    }

    /// Record a new cover image; returns the name of the cover it replaces
    pub async fn set_cover(
        &self,
        id: i32,
        name: &str,
        width: i32,
        height: i32,
    ) -> AppResult<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<Option<String>> =
            sqlx::query_scalar("SELECT cover_image FROM books WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let previous =
            previous.ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        sqlx::query(
            r#"
            UPDATE books
            SET cover_image = $2, cover_image_width = $3, cover_image_height = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(width)
        .bind(height)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous)
    }

    /// Delete a book, refused while copies exist; returns its cover name
    pub async fn delete(&self, id: i32) -> AppResult<Option<String>> {
        let cover: Option<Option<String>> =
            sqlx::query_scalar("DELETE FROM books WHERE id = $1 RETURNING cover_image")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_delete_error)?;

        cover.ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }
}
