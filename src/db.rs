//! SQLite track catalog.
//!
//! The catalog stores raw corpus rows exactly as imported. Every attribute
//! column is nullable; validation happens when the corpus is prepared.

use crate::error::PrepareError;
use crate::track::CorpusRow;
use log::{debug, info};
use rusqlite::{params, Connection, Row};
use std::fs;
use std::path::Path;

/// Open the catalog at `path`, creating the `tracks` table if missing.
pub fn open(path: &Path) -> Result<Connection, PrepareError> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// In-memory catalog, mostly for tests and one-off preparation.
pub fn open_in_memory() -> Result<Connection, PrepareError> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), PrepareError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks (
            seq                      INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id                 TEXT UNIQUE,
            track_name               TEXT,
            track_artist             TEXT,
            danceability             REAL,
            energy                   REAL,
            loudness                 REAL,
            speechiness              REAL,
            acousticness             REAL,
            instrumentalness         REAL,
            liveness                 REAL,
            valence                  REAL,
            tempo                    REAL,
            track_album_release_date TEXT,
            track_popularity         INTEGER,
            playlist_genre           TEXT,
            playlist_subgenre        TEXT,
            lyrics                   TEXT
        )",
        (),
    )?;
    Ok(())
}

/// Insert `rows` in one transaction. Rows with an existing `track_id` are
/// updated in place and keep their original position. With `replace_all`,
/// the table is emptied first.
///
/// Returns the number of rows written.
pub fn import_rows(conn: &mut Connection, rows: &[CorpusRow], replace_all: bool) -> Result<usize, PrepareError> {
    let tx = conn.transaction()?;

    if replace_all {
        let removed = tx.execute("DELETE FROM tracks", ())?;
        debug!("Cleared {removed} existing catalog rows");
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO tracks (
                track_id, track_name, track_artist,
                danceability, energy, loudness, speechiness, acousticness,
                instrumentalness, liveness, valence, tempo,
                track_album_release_date, track_popularity,
                playlist_genre, playlist_subgenre, lyrics
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(track_id) DO UPDATE SET
                track_name = excluded.track_name,
                track_artist = excluded.track_artist,
                danceability = excluded.danceability,
                energy = excluded.energy,
                loudness = excluded.loudness,
                speechiness = excluded.speechiness,
                acousticness = excluded.acousticness,
                instrumentalness = excluded.instrumentalness,
                liveness = excluded.liveness,
                valence = excluded.valence,
                tempo = excluded.tempo,
                track_album_release_date = excluded.track_album_release_date,
                track_popularity = excluded.track_popularity,
                playlist_genre = excluded.playlist_genre,
                playlist_subgenre = excluded.playlist_subgenre,
                lyrics = excluded.lyrics",
        )?;

        for row in rows {
            stmt.execute(params![
                row.track_id,
                row.track_name,
                row.track_artist,
                row.danceability,
                row.energy,
                row.loudness,
                row.speechiness,
                row.acousticness,
                row.instrumentalness,
                row.liveness,
                row.valence,
                row.tempo,
                row.track_album_release_date,
                row.track_popularity,
                row.playlist_genre,
                row.playlist_subgenre,
                row.lyrics,
            ])?;
        }
    }

    tx.commit()?;
    info!("Imported {} rows into catalog", rows.len());
    Ok(rows.len())
}

fn row_to_corpus(row: &Row<'_>) -> rusqlite::Result<CorpusRow> {
    Ok(CorpusRow {
        track_id: row.get(0)?,
        track_name: row.get(1)?,
        track_artist: row.get(2)?,
        danceability: row.get(3)?,
        energy: row.get(4)?,
        loudness: row.get(5)?,
        speechiness: row.get(6)?,
        acousticness: row.get(7)?,
        instrumentalness: row.get(8)?,
        liveness: row.get(9)?,
        valence: row.get(10)?,
        tempo: row.get(11)?,
        track_album_release_date: row.get(12)?,
        track_popularity: row.get(13)?,
        playlist_genre: row.get(14)?,
        playlist_subgenre: row.get(15)?,
        lyrics: row.get(16)?,
    })
}

/// All catalog rows, in insertion order.
pub fn load_rows(conn: &Connection) -> Result<Vec<CorpusRow>, PrepareError> {
    let mut stmt = conn.prepare(
        "SELECT track_id, track_name, track_artist,
                danceability, energy, loudness, speechiness, acousticness,
                instrumentalness, liveness, valence, tempo,
                track_album_release_date, track_popularity,
                playlist_genre, playlist_subgenre, lyrics
         FROM tracks ORDER BY seq",
    )?;

    let rows = stmt
        .query_map([], row_to_corpus)?
        .collect::<Result<Vec<_>, _>>()?;
    debug!("Loaded {} rows from catalog", rows.len());
    Ok(rows)
}

pub fn count_tracks(conn: &Connection) -> Result<usize, PrepareError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Read a JSON array of corpus rows from disk.
pub fn read_rows_json(path: &Path) -> Result<Vec<CorpusRow>, PrepareError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
