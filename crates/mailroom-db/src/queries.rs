use crate::Database;
use crate::models::{LegacyText, MessageRow, RawBytes, UserRow};
use crate::settings::{UnreadableSettings, UserSettings};
use anyhow::Result;
use mailroom_types::MailBox;
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{Connection, Row};

/// A message about to be written, with its receivers.
pub struct NewMessage {
    pub message_id: String,
    pub author_id: String,
    pub subject: String,
    pub body: String,
    pub mkdate: i64,
    pub priority: String,
    pub receivers: Vec<String>,
}

/// The acting user's delivery rows joined with the shared message. The
/// counterpart is the lowest user id on the other side of the message.
const MESSAGE_QUERY: &str = "SELECT m.message_id, m.autor_id,
            COALESCE((SELECT MIN(mu2.user_id) FROM message_user AS mu2
                      WHERE mu2.message_id = mu.message_id AND mu2.snd_rec != mu.snd_rec), ''),
            m.subject, m.message, m.mkdate, m.priority, 1 - mu.readed,
            mu.folder, mu.snd_rec, mu.dont_delete
         FROM message AS m
         INNER JOIN message_user AS mu
             ON (m.message_id = mu.message_id AND mu.user_id = ?1)
         WHERE mu.deleted = 0";

/// Ids bound per statement, well below SQLite's host parameter limit.
pub const IDS_PER_QUERY: usize = 500;

impl Database {
    // -- Users --

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, user_id))
    }

    // -- Messages --

    /// Load one message as seen by `user_id`. Deleted deliveries are
    /// invisible. A message sent to oneself is shown as its inbox copy.
    pub fn load_message(&self, user_id: &str, message_id: &str) -> Result<Option<MessageRow>> {
        Ok(self.load_deliveries(user_id, message_id)?.into_iter().next())
    }

    /// Every visible copy of a message the user holds, inbox copy first.
    /// Only a message sent to oneself has more than one.
    pub fn load_deliveries(&self, user_id: &str, message_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_QUERY} AND m.message_id = ?2 ORDER BY mu.snd_rec");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, message_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Load several messages from one box of the user, newest first.
    pub fn load_messages(&self, user_id: &str, mailbox: MailBox, message_ids: &[String]) -> Result<Vec<MessageRow>> {
        let mut rows = Vec::with_capacity(message_ids.len());
        for chunk in message_ids.chunks(IDS_PER_QUERY) {
            rows.extend(self.with_conn(|conn| query_box(conn, user_id, mailbox, chunk))?);
        }
        rows.sort_by(|a, b| b.mkdate.cmp(&a.mkdate));
        Ok(rows)
    }

    /// Ids of the visible messages in one folder of one box.
    pub fn folder_message_ids(&self, user_id: &str, mailbox: MailBox, folder: u32) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id
                 FROM message_user
                 WHERE snd_rec = ?1 AND folder = ?2 AND user_id = ?3 AND deleted = 0",
            )?;

            let ids = stmt
                .query_map(rusqlite::params![mailbox.direction(), folder, user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(ids)
        })
    }

    /// Returns false when no delivery row was updated.
    pub fn move_message(&self, user_id: &str, message_id: &str, mailbox: MailBox, folder: u32) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE message_user SET folder = ?1
                 WHERE message_id = ?2 AND user_id = ?3 AND snd_rec = ?4",
                rusqlite::params![folder, message_id, user_id, mailbox.direction()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_read(&self, user_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE message_user SET readed = 1 WHERE message_id = ?1 AND user_id = ?2",
                rusqlite::params![message_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Flag the user's delivery rows as deleted. Once no participant has an
    /// undeleted delivery left, the message and its delivery rows are purged.
    /// Protected deliveries are never touched. Returns false when nothing changed.
    pub fn delete_message(&self, user_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE message_user SET deleted = 1
                 WHERE message_id = ?1 AND user_id = ?2 AND deleted = 0 AND dont_delete = 0",
                rusqlite::params![message_id, user_id],
            )?;

            if changed > 0 {
                let remaining: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM message_user WHERE message_id = ?1 AND deleted = 0",
                    [message_id],
                    |row| row.get(0),
                )?;

                if remaining == 0 {
                    tx.execute("DELETE FROM message_user WHERE message_id = ?1", [message_id])?;
                    tx.execute("DELETE FROM message WHERE message_id = ?1", [message_id])?;
                }
            }

            tx.commit()?;
            Ok(changed > 0)
        })
    }

    /// Insert the shared message row, the author's outbox delivery and one
    /// inbox delivery per distinct receiver, all or nothing.
    pub fn insert_message(&self, message: &NewMessage) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO message (message_id, autor_id, subject, message, mkdate, priority)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.message_id,
                    message.author_id,
                    message.subject,
                    message.body,
                    message.mkdate,
                    message.priority
                ],
            )?;

            tx.execute(
                "INSERT INTO message_user (user_id, message_id, snd_rec, folder, readed, mkdate)
                 VALUES (?1, ?2, 'snd', 0, 1, ?3)",
                rusqlite::params![message.author_id, message.message_id, message.mkdate],
            )?;

            let mut receivers: Vec<&String> = message.receivers.iter().collect();
            receivers.sort();
            receivers.dedup();
            for receiver in receivers {
                tx.execute(
                    "INSERT INTO message_user (user_id, message_id, snd_rec, folder, readed, mkdate)
                     VALUES (?1, ?2, 'rec', 0, 0, ?3)",
                    rusqlite::params![receiver, message.message_id, message.mkdate],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    // -- User settings --

    /// The user's settings. A missing row reads as empty settings; a blob
    /// that cannot be parsed is an [`UnreadableSettings`] error.
    pub fn get_user_settings(&self, user_id: &str) -> Result<UserSettings> {
        self.with_conn(|conn| {
            let raw: Option<RawBytes> = conn
                .query_row("SELECT val FROM user_data WHERE sid = ?1", [user_id], |row| row.get(0))
                .optional()?;

            let Some(RawBytes(raw)) = raw else {
                return Ok(UserSettings::default());
            };

            UserSettings::parse(&raw).map_err(|reason| {
                anyhow::Error::from(UnreadableSettings {
                    user_id: user_id.to_string(),
                    reason,
                })
            })
        })
    }

    /// Replace the user's settings blob, in the format it was read in.
    /// Last writer wins.
    pub fn save_user_settings(&self, user_id: &str, settings: &UserSettings) -> Result<()> {
        let val = match String::from_utf8(settings.encode()?) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Blob(e.into_bytes()),
        };
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO user_data (sid, val, changed)
                 VALUES (?1, ?2, CAST(strftime('%s', 'now') AS INTEGER))
                 ON CONFLICT(sid) DO UPDATE SET val = excluded.val, changed = excluded.changed",
                rusqlite::params![user_id, val],
            )?;
            Ok(())
        })
    }
}

fn query_box(conn: &Connection, user_id: &str, mailbox: MailBox, message_ids: &[String]) -> Result<Vec<MessageRow>> {
    let placeholders: Vec<String> = (3..message_ids.len() + 3).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "{MESSAGE_QUERY} AND mu.snd_rec = ?2 AND m.message_id IN ({})
         ORDER BY m.mkdate DESC",
        placeholders.join(", ")
    );

    let direction = mailbox.direction();
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(message_ids.len() + 2);
    params.push(&user_id);
    params.push(&direction);
    params.extend(message_ids.iter().map(|id| id as &dyn ToSql));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params.as_slice(), message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        message_id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        subject: row.get::<_, LegacyText>(3)?.into(),
        message: row.get::<_, LegacyText>(4)?.into(),
        mkdate: row.get(5)?,
        priority: row.get(6)?,
        unread: row.get(7)?,
        folder: row.get(8)?,
        snd_rec: row.get(9)?,
        dont_delete: row.get(10)?,
    })
}

fn query_user(conn: &Connection, user_id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, username, perms, Vorname, Nachname, Email
         FROM auth_user_md5 WHERE user_id = ?1",
    )?;

    let row = stmt
        .query_row([user_id], |row| {
            Ok(UserRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                perms: row.get(2)?,
                forename: row.get::<_, LegacyText>(3)?.into(),
                lastname: row.get::<_, LegacyText>(4)?.into(),
                email: row.get::<_, LegacyText>(5)?.into(),
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "a11ce000000000000000000000000000";
    const BOB: &str = "b0b00000000000000000000000000000";

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "INSERT INTO auth_user_md5 (user_id, username, Vorname, Nachname, Email)
                     VALUES ('{ALICE}', 'alice', 'Alice', 'Liddell', 'alice@example.org');
                 INSERT INTO auth_user_md5 (user_id, username, Vorname, Nachname, Email)
                     VALUES ('{BOB}', 'bob', 'Bob', 'Builder', 'bob@example.org');"
            ))?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn send(db: &Database, id: &str, mkdate: i64) {
        db.insert_message(&NewMessage {
            message_id: id.to_string(),
            author_id: ALICE.to_string(),
            subject: format!("subject {id}"),
            body: "hello".to_string(),
            mkdate,
            priority: "normal".to_string(),
            receivers: vec![BOB.to_string(), BOB.to_string()],
        })
        .unwrap();
    }

    #[test]
    fn load_resolves_counterpart_for_both_sides() {
        let db = seeded();
        send(&db, "m1", 100);

        let for_bob = db.load_message(BOB, "m1").unwrap().unwrap();
        assert_eq!(for_bob.sender_id, ALICE);
        assert_eq!(for_bob.receiver_id, ALICE);
        assert!(for_bob.unread);
        assert_eq!(for_bob.snd_rec, "rec");

        let for_alice = db.load_message(ALICE, "m1").unwrap().unwrap();
        assert_eq!(for_alice.sender_id, ALICE);
        assert_eq!(for_alice.receiver_id, BOB);
        assert!(!for_alice.unread);
    }

    #[test]
    fn load_many_is_newest_first() {
        let db = seeded();
        send(&db, "old", 100);
        send(&db, "new", 300);
        send(&db, "mid", 200);

        let ids = db.folder_message_ids(BOB, MailBox::In, 0).unwrap();
        assert_eq!(ids.len(), 3);

        let rows = db.load_messages(BOB, MailBox::In, &ids).unwrap();
        let order: Vec<&str> = rows.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(order, vec!["new", "mid", "old"]);
    }

    #[test]
    fn delete_hides_then_purges() {
        let db = seeded();
        send(&db, "m1", 100);

        assert!(db.delete_message(BOB, "m1").unwrap());
        assert!(db.load_message(BOB, "m1").unwrap().is_none());
        assert!(db.load_message(ALICE, "m1").unwrap().is_some());
        assert!(!db.delete_message(BOB, "m1").unwrap());

        assert!(db.delete_message(ALICE, "m1").unwrap());
        let left: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM message WHERE message_id = 'm1'", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn protected_delivery_is_not_deleted() {
        let db = seeded();
        send(&db, "m1", 100);
        db.with_conn(|conn| {
            conn.execute("UPDATE message_user SET dont_delete = 1 WHERE user_id = ?1", [BOB])?;
            Ok(())
        })
        .unwrap();

        assert!(!db.delete_message(BOB, "m1").unwrap());
        assert!(db.load_message(BOB, "m1").unwrap().unwrap().dont_delete);
    }

    #[test]
    fn move_only_touches_the_given_box() {
        let db = seeded();
        send(&db, "m1", 100);

        assert!(db.move_message(BOB, "m1", MailBox::In, 2).unwrap());
        assert_eq!(db.load_message(BOB, "m1").unwrap().unwrap().folder, 2);
        assert!(!db.move_message(BOB, "m1", MailBox::Out, 2).unwrap());
        assert_eq!(db.folder_message_ids(BOB, MailBox::In, 2).unwrap(), vec!["m1".to_string()]);
    }

    #[test]
    fn settings_default_to_empty_and_roundtrip() {
        let db = seeded();
        assert_eq!(db.get_user_settings(ALICE).unwrap(), UserSettings::default());

        let settings = UserSettings::new(serde_json::json!({ "theme": "dark" }));
        db.save_user_settings(ALICE, &settings).unwrap();
        db.save_user_settings(ALICE, &settings).unwrap();
        assert_eq!(db.get_user_settings(ALICE).unwrap(), settings);
    }

    fn store_blob(db: &Database, user_id: &str, val: rusqlite::types::Value) {
        db.with_conn(|conn| {
            conn.execute("INSERT INTO user_data (sid, val) VALUES (?1, ?2)", rusqlite::params![user_id, val])?;
            Ok(())
        })
        .unwrap();
    }

    fn stored_blob(db: &Database, user_id: &str) -> Vec<u8> {
        db.with_conn(|conn| {
            let RawBytes(raw) = conn.query_row("SELECT val FROM user_data WHERE sid = ?1", [user_id], |r| r.get(0))?;
            Ok(raw)
        })
        .unwrap()
    }

    #[test]
    fn host_settings_are_written_back_in_kind() {
        let db = seeded();
        let blob = b"a:2:{s:5:\"theme\";s:4:\"dark\";s:9:\"signature\";s:5:\"Gr\xfc\xdfe\";}".to_vec();
        store_blob(&db, ALICE, rusqlite::types::Value::Blob(blob.clone()));

        let mut settings = db.get_user_settings(ALICE).unwrap();
        assert_eq!(settings.value["signature"], "Grüße");
        settings.value["extra"] = serde_json::json!(1);
        db.save_user_settings(ALICE, &settings).unwrap();

        let mut expected = blob[..blob.len() - 1].to_vec();
        expected.extend_from_slice(b"s:5:\"extra\";i:1;}");
        expected[2] = b'3';
        assert_eq!(stored_blob(&db, ALICE), expected);
    }

    #[test]
    fn unreadable_settings_are_an_error() {
        let db = seeded();
        store_blob(&db, BOB, rusqlite::types::Value::Text("a:1:{s:5:\"theme\";".into()));

        let err = db.get_user_settings(BOB).unwrap_err();
        let unreadable = err.downcast_ref::<UnreadableSettings>().unwrap();
        assert_eq!(unreadable.user_id, BOB);
        assert_eq!(stored_blob(&db, BOB), b"a:1:{s:5:\"theme\";");
    }

    #[test]
    fn legacy_text_is_decoded() {
        let db = seeded();
        send(&db, "m1", 100);
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE message SET subject = ?1 WHERE message_id = 'm1'",
                [rusqlite::types::Value::Blob(vec![b'G', b'r', 0xFC, 0xDF, b'e'])],
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.load_message(BOB, "m1").unwrap().unwrap().subject, "Grüße");
    }

    #[test]
    fn message_to_oneself_has_two_copies() {
        let db = seeded();
        db.insert_message(&NewMessage {
            message_id: "self".to_string(),
            author_id: ALICE.to_string(),
            subject: "note".to_string(),
            body: "remember".to_string(),
            mkdate: 100,
            priority: "normal".to_string(),
            receivers: vec![ALICE.to_string()],
        })
        .unwrap();

        let copies = db.load_deliveries(ALICE, "self").unwrap();
        let sides: Vec<&str> = copies.iter().map(|r| r.snd_rec.as_str()).collect();
        assert_eq!(sides, vec!["rec", "snd"]);
        assert!(copies.iter().all(|r| r.sender_id == ALICE && r.receiver_id == ALICE));

        let shown = db.load_message(ALICE, "self").unwrap().unwrap();
        assert_eq!(shown.snd_rec, "rec");
        assert!(shown.unread);

        let outbox = db.load_messages(ALICE, MailBox::Out, &["self".to_string()]).unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].snd_rec, "snd");
        assert!(!outbox[0].unread);

        assert!(db.move_message(ALICE, "self", MailBox::Out, 3).unwrap());
        assert_eq!(db.folder_message_ids(ALICE, MailBox::Out, 3).unwrap(), vec!["self".to_string()]);
        assert_eq!(db.folder_message_ids(ALICE, MailBox::In, 0).unwrap(), vec!["self".to_string()]);
    }

    #[test]
    fn large_folders_load_across_statements() {
        let db = seeded();
        let total = IDS_PER_QUERY * 2 + 1;
        for i in 0..total {
            send(&db, &format!("m{i}"), i as i64);
        }

        let ids = db.folder_message_ids(BOB, MailBox::In, 0).unwrap();
        assert_eq!(ids.len(), total);

        let rows = db.load_messages(BOB, MailBox::In, &ids).unwrap();
        assert_eq!(rows.len(), total);
        assert_eq!(rows[0].message_id, format!("m{}", total - 1));
        assert_eq!(rows[total - 1].message_id, "m0");
        assert!(rows.windows(2).all(|w| w[0].mkdate >= w[1].mkdate));
    }

    #[test]
    fn unknown_user_is_none() {
        let db = seeded();
        assert!(db.get_user("nobody").unwrap().is_none());
        assert_eq!(db.get_user(BOB).unwrap().unwrap().username, "bob");
    }
}
