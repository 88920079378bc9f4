//! SQL schema and statements for the mqttmirror MySQL store.
//!
//! `topic` uses a binary collation so lookups are exact and case-sensitive.
//! VARCHAR(768) in utf8mb4 is the widest column InnoDB can index.

use mqttmirror_core::schema::TableNames;

const ROW_COLUMNS: &str =
  "`id`, `topic`, `value`, `ts`, `qos`, `retain`, `history_enable`, `history_diffonly`";

const ENTRY_COLUMNS: &str = "`id`, `ts`, `ts_last`, `topic`, `value`";

/// Schema DDL, one statement per element; each is idempotent.
pub fn schema(names: &TableNames) -> Vec<String> {
  let TableNames { topics, history, view } = names;
  vec![
    format!(
      "CREATE TABLE IF NOT EXISTS `{topics}` (
         `id`               BIGINT       NOT NULL AUTO_INCREMENT,
         `ts`               DATETIME(6)  NOT NULL,
         `topic`            VARCHAR(768) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
         `value`            LONGBLOB     NOT NULL,
         `qos`              TINYINT      NOT NULL DEFAULT 0,
         `retain`           TINYINT      NOT NULL DEFAULT 0,
         `history_enable`   TINYINT      NOT NULL DEFAULT 1,
         `history_diffonly` TINYINT      NOT NULL DEFAULT 1,
         PRIMARY KEY (`id`),
         UNIQUE KEY `{topics}_topic_uq` (`topic`)
       ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4"
    ),
    format!(
      "CREATE TABLE IF NOT EXISTS `{history}` (
         `id`        BIGINT      NOT NULL AUTO_INCREMENT,
         `ts`        DATETIME(6) NOT NULL,
         `topic_ref` BIGINT      NOT NULL,
         `value`     LONGBLOB,
         PRIMARY KEY (`id`),
         KEY `{history}_topic_ref_idx` (`topic_ref`),
         CONSTRAINT `{history}_topic_ref_fk`
           FOREIGN KEY (`topic_ref`) REFERENCES `{topics}` (`id`) ON DELETE CASCADE
       ) ENGINE = InnoDB"
    ),
    format!(
      "CREATE OR REPLACE VIEW `{view}` AS
         SELECT h.`id`    AS `id`,
                h.`ts`    AS `ts`,
                m.`ts`    AS `ts_last`,
                m.`topic` AS `topic`,
                h.`value` AS `value`
           FROM `{history}` h
           JOIN `{topics}`  m ON m.`id` = h.`topic_ref`"
    ),
  ]
}

/// SQL text for one set of table names.
pub struct Statements {
  pub ddl:                    Vec<String>,
  pub select_by_topic:        String,
  pub select_by_topic_locked: String,
  pub select_all:             String,
  pub insert_row:             String,
  pub update_row:             String,
  pub insert_history:         String,
  pub select_history:         String,
  pub update_flags:           String,
}

impl Statements {
  pub fn new(names: &TableNames) -> Self {
    let TableNames { topics, history, view } = names;
    let select_by_topic = format!("SELECT {ROW_COLUMNS} FROM `{topics}` WHERE `topic` = ?");
    Self {
      ddl:                    schema(names),
      select_by_topic_locked: format!("{select_by_topic} FOR UPDATE"),
      select_by_topic,
      select_all:             format!("SELECT {ROW_COLUMNS} FROM `{topics}` ORDER BY `id`"),
      insert_row:             format!(
        "INSERT INTO `{topics}` (`ts`, `topic`, `value`, `qos`, `retain`, `history_enable`, `history_diffonly`)
         VALUES (?, ?, ?, ?, ?, ?, ?)"
      ),
      update_row:             format!(
        "UPDATE `{topics}` SET `ts` = ?, `value` = ?, `qos` = ?, `retain` = ? WHERE `id` = ?"
      ),
      insert_history:         format!(
        "INSERT INTO `{history}` (`ts`, `topic_ref`, `value`) VALUES (?, ?, ?)"
      ),
      select_history:         format!(
        "SELECT {ENTRY_COLUMNS} FROM `{view}` WHERE `topic` = ? ORDER BY `id`"
      ),
      update_flags:           format!(
        "UPDATE `{topics}` SET `history_enable` = ?, `history_diffonly` = ? WHERE `topic` = ?"
      ),
    }
  }
}
