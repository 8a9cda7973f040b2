//! Deferred index creation for InnoDB table definitions.
//!
//! Building secondary indexes after the bulk load is faster than maintaining
//! them row by row, so a CREATE TABLE is split into a reduced statement
//! (columns and primary key only) and one ALTER TABLE that re-adds the
//! removed indexes — and, for targets that support it, foreign key
//! constraints — once the data file has been loaded.

use crate::error::SplitError;

/// What a top-level clause of a CREATE TABLE body is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseKind {
    Column,
    PrimaryKey,
    SecondaryIndex,
    ForeignKey,
    Other,
}

fn classify_clause(clause: &str) -> ClauseKind {
    let upper = clause.trim_start().to_ascii_uppercase();
    if upper.starts_with("PRIMARY KEY") {
        ClauseKind::PrimaryKey
    } else if upper.starts_with("KEY")
        || upper.starts_with("INDEX")
        || upper.starts_with("UNIQUE")
        || upper.starts_with("FULLTEXT")
        || upper.starts_with("SPATIAL")
    {
        ClauseKind::SecondaryIndex
    } else if upper.starts_with("FOREIGN KEY") {
        ClauseKind::ForeignKey
    } else if upper.starts_with("CONSTRAINT") {
        // CONSTRAINT also introduces CHECK clauses, which cannot be deferred.
        if upper.contains("FOREIGN KEY") {
            ClauseKind::ForeignKey
        } else {
            ClauseKind::Other
        }
    } else if upper.starts_with("CHECK") {
        ClauseKind::Other
    } else {
        ClauseKind::Column
    }
}

/// Locate the CREATE TABLE statement embedded in a table definition section.
///
/// The statement runs from the keyword to the first `;` at parenthesis depth
/// zero outside quoted tokens. mysqldump surrounds it with DROP TABLE and
/// conditional SET comments that must not be disturbed.
pub fn extract_create_table(section: &str) -> Option<&str> {
    let start = section.find("CREATE TABLE")?;
    let rest = &section[start..];
    let bytes = rest.as_bytes();

    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if b == b'\\' && q == b'\'' {
                    escaped = true;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth -= 1,
                b';' if depth == 0 => return Some(&rest[..=i]),
                _ => {}
            },
        }
    }
    None
}

/// Split a CREATE TABLE into a reduced statement and a deferred ALTER TABLE
/// that re-adds the removed secondary indexes (and, when `defer_constraints`,
/// foreign keys) in their original order.
///
/// When nothing is removable the input is returned unchanged with no ALTER,
/// which also makes the operation idempotent on its own reduced output.
pub fn split_indexes(
    ddl: &str,
    defer_constraints: bool,
) -> Result<(String, Option<String>), SplitError> {
    let (open, close) = body_span(ddl)?;
    let body = &ddl[open + 1..close];
    let clauses = split_clauses(body)?;

    let mut kept: Vec<&str> = Vec::new();
    let mut deferred: Vec<&str> = Vec::new();
    for clause in clauses {
        match classify_clause(clause) {
            ClauseKind::SecondaryIndex => deferred.push(clause),
            ClauseKind::ForeignKey if defer_constraints => deferred.push(clause),
            _ => kept.push(clause),
        }
    }
    if deferred.is_empty() {
        return Ok((ddl.to_string(), None));
    }

    let table = table_name_token(ddl).ok_or(SplitError::UnparsableDdl {
        reason: "CREATE TABLE has no table name",
    })?;

    // Clauses keep their original leading whitespace, so rejoining repairs
    // the commas; only the closing-paren indentation needs restoring.
    let tail = &body[body.trim_end().len()..];
    let reduced_body = format!("{}{}", kept.join(",").trim_end(), tail);
    let reduced = format!("{}({}){}", &ddl[..open], reduced_body, &ddl[close + 1..]);

    let additions = deferred
        .iter()
        .map(|clause| format!("ADD {}", clause.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let alter = format!("ALTER TABLE {} {};", table, additions);

    Ok((reduced, Some(alter)))
}

/// Byte offsets of the outermost `(` and its matching `)`.
fn body_span(ddl: &str) -> Result<(usize, usize), SplitError> {
    let bytes = ddl.as_bytes();
    let mut depth = 0i32;
    let mut open = None;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if b == b'\\' && q == b'\'' {
                    escaped = true;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => {
                    if depth == 0 {
                        open = Some(i);
                    }
                    depth += 1;
                }
                b')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(SplitError::UnparsableDdl {
                            reason: "unbalanced parentheses in CREATE TABLE",
                        });
                    }
                    if depth == 0 {
                        if let Some(open) = open {
                            return Ok((open, i));
                        }
                    }
                }
                _ => {}
            },
        }
    }
    Err(SplitError::UnparsableDdl {
        reason: if quote.is_some() {
            "unterminated quote in CREATE TABLE"
        } else {
            "unbalanced parentheses in CREATE TABLE"
        },
    })
}

/// Split a clause list on commas at parenthesis depth zero, outside single,
/// double, and backtick quoting. A naive comma split would break composite
/// definitions like `KEY (a,b)`; depth and quote state must be tracked
/// explicitly.
pub fn split_clauses(body: &str) -> Result<Vec<&str>, SplitError> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if b == b'\\' && q == b'\'' {
                    escaped = true;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(SplitError::UnparsableDdl {
                            reason: "unbalanced parentheses in clause list",
                        });
                    }
                }
                b',' if depth == 0 => {
                    parts.push(&body[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    if depth != 0 {
        return Err(SplitError::UnparsableDdl {
            reason: "unbalanced parentheses in clause list",
        });
    }
    if quote.is_some() {
        return Err(SplitError::UnparsableDdl {
            reason: "unterminated quote in clause list",
        });
    }
    parts.push(&body[start..]);
    Ok(parts)
}

/// The raw table-name token after CREATE TABLE, quoting preserved, so it can
/// be spliced verbatim into the generated ALTER TABLE.
fn table_name_token(ddl: &str) -> Option<&str> {
    let after = ddl.find("CREATE TABLE")? + "CREATE TABLE".len();
    let rest = &ddl[after..];
    let start = after + (rest.len() - rest.trim_start().len());
    let bytes = ddl.as_bytes();

    if bytes.get(start) == Some(&b'`') {
        let mut i = start + 1;
        while i < bytes.len() {
            if bytes[i] == b'`' {
                if bytes.get(i + 1) == Some(&b'`') {
                    i += 2;
                    continue;
                }
                return Some(&ddl[start..=i]);
            }
            i += 1;
        }
        None
    } else {
        let len = ddl[start..]
            .find(|c: char| c.is_whitespace() || c == '(')
            .unwrap_or(ddl.len() - start);
        (len > 0).then(|| &ddl[start..start + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = "CREATE TABLE `orders` (\n  \
                          `id` int(11) NOT NULL AUTO_INCREMENT,\n  \
                          `customer_id` int(11) NOT NULL,\n  \
                          `placed_at` datetime DEFAULT NULL,\n  \
                          PRIMARY KEY (`id`),\n  \
                          KEY `idx_customer` (`customer_id`),\n  \
                          KEY `idx_placed` (`placed_at`,`customer_id`)\n\
                          ) ENGINE=InnoDB DEFAULT CHARSET=utf8;";

    #[test]
    fn test_split_clauses_respects_nesting() {
        let parts = split_clauses("`id` int(10,2), KEY `k` (`a`,`b`), `note` varchar(20)").unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].trim(), "KEY `k` (`a`,`b`)");
    }

    #[test]
    fn test_split_clauses_respects_quoting() {
        let parts = split_clauses("`a` varchar(10) DEFAULT 'x,y', `b` int(11)").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].trim(), "`a` varchar(10) DEFAULT 'x,y'");
    }

    #[test]
    fn test_split_clauses_unbalanced() {
        assert!(matches!(
            split_clauses("`a` int(11, KEY `k` (`a`)"),
            Err(SplitError::UnparsableDdl { .. })
        ));
    }

    #[test]
    fn test_split_indexes_defers_secondary_keys() {
        let (reduced, alter) = split_indexes(ORDERS, false).unwrap();
        assert!(!reduced.contains("KEY `idx_customer`"));
        assert!(!reduced.contains("KEY `idx_placed`"));
        assert!(reduced.contains("PRIMARY KEY (`id`)"));
        assert!(reduced.contains("`customer_id` int(11) NOT NULL"));
        assert_eq!(
            alter.unwrap(),
            "ALTER TABLE `orders` ADD KEY `idx_customer` (`customer_id`), \
             ADD KEY `idx_placed` (`placed_at`,`customer_id`);"
        );
    }

    #[test]
    fn test_split_indexes_keeps_constraints_by_default() {
        let ddl = "CREATE TABLE `t` (\n  `id` int(11) NOT NULL,\n  `p` int(11),\n  \
                   PRIMARY KEY (`id`),\n  \
                   CONSTRAINT `fk_p` FOREIGN KEY (`p`) REFERENCES `parent` (`id`)\n\
                   ) ENGINE=InnoDB;";
        let (reduced, alter) = split_indexes(ddl, false).unwrap();
        assert_eq!(reduced, ddl);
        assert!(alter.is_none());

        let (reduced, alter) = split_indexes(ddl, true).unwrap();
        assert!(!reduced.contains("CONSTRAINT"));
        assert_eq!(
            alter.unwrap(),
            "ALTER TABLE `t` ADD CONSTRAINT `fk_p` FOREIGN KEY (`p`) REFERENCES `parent` (`id`);"
        );
    }

    #[test]
    fn test_split_indexes_no_removable_clause_is_identity() {
        let ddl = "CREATE TABLE `plain` (\n  `id` int(11) NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB;";
        let (reduced, alter) = split_indexes(ddl, true).unwrap();
        assert_eq!(reduced, ddl);
        assert!(alter.is_none());
    }

    #[test]
    fn test_split_indexes_idempotent_on_reduced_output() {
        let (reduced, _) = split_indexes(ORDERS, false).unwrap();
        let (again, alter) = split_indexes(&reduced, false).unwrap();
        assert_eq!(again, reduced);
        assert!(alter.is_none());
    }

    #[test]
    fn test_split_indexes_unbalanced_fails_closed() {
        let ddl = "CREATE TABLE `bad` (`id` int(11, KEY `k` (`id`) ENGINE=InnoDB;";
        assert!(matches!(
            split_indexes(ddl, false),
            Err(SplitError::UnparsableDdl { .. })
        ));
    }

    #[test]
    fn test_extract_create_table_from_section() {
        let section = "--\n-- Table structure for table `t`\n--\n\n\
                       DROP TABLE IF EXISTS `t`;\n\
                       /*!40101 SET @saved_cs_client = @@character_set_client */;\n\
                       CREATE TABLE `t` (\n  `name` varchar(20) DEFAULT 'a;b'\n) ENGINE=InnoDB;\n\
                       /*!40101 SET character_set_client = @saved_cs_client */;\n";
        let ddl = extract_create_table(section).unwrap();
        assert!(ddl.starts_with("CREATE TABLE `t`"));
        assert!(ddl.ends_with(") ENGINE=InnoDB;"));
        assert!(ddl.contains("'a;b'"));
    }

    #[test]
    fn test_table_name_token_escaped_backtick() {
        let ddl = "CREATE TABLE `odd``name` (`id` int(11), KEY `k` (`id`)) ENGINE=InnoDB;";
        let (_, alter) = split_indexes(ddl, false).unwrap();
        assert_eq!(
            alter.unwrap(),
            "ALTER TABLE `odd``name` ADD KEY `k` (`id`);"
        );
    }
}
