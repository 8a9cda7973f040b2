use dumpsplit::scanner::{extract_identifier, SectionKind, SectionScanner};

fn scan_kinds(input: &[u8]) -> Vec<SectionKind> {
    let mut scanner = SectionScanner::new(input);
    let mut kinds = Vec::new();
    while let Some(mut section) = scanner.next_section().unwrap() {
        kinds.push(section.kind());
        section.drain().unwrap();
    }
    kinds
}

fn reassemble(input: &[u8]) -> Vec<u8> {
    let mut scanner = SectionScanner::new(input);
    let mut out = Vec::new();
    while let Some(mut section) = scanner.next_section().unwrap() {
        while let Some(line) = section.next_line().unwrap() {
            out.extend_from_slice(&line);
        }
    }
    out
}

#[test]
fn test_full_dump_section_order() {
    let input = concat!(
        "-- MySQL dump 10.13  Distrib 5.5.30, for Linux (x86_64)\n",
        "--\n",
        "-- Host: localhost    Database: shop\n",
        "\n",
        "--\n",
        "-- Position to start replication or point-in-time recovery from\n",
        "--\n",
        "CHANGE MASTER TO MASTER_LOG_FILE='mysql-bin.000002';\n",
        "--\n",
        "-- Current Database: `shop`\n",
        "--\n",
        "CREATE DATABASE `shop`;\n",
        "--\n",
        "-- Table structure for table `orders`\n",
        "--\n",
        "CREATE TABLE `orders` (`id` int(11));\n",
        "--\n",
        "-- Dumping data for table `orders`\n",
        "--\n",
        "INSERT INTO `orders` VALUES (1);\n",
        "--\n",
        "-- Temporary table structure for view `v`\n",
        "--\n",
        "CREATE TABLE `v` (`id` int(11));\n",
        "--\n",
        "-- Final view structure for view `v`\n",
        "--\n",
        "CREATE VIEW `v` AS SELECT 1;\n",
        "--\n",
        "-- Dumping routines for database 'shop'\n",
        "--\n",
        "CREATE PROCEDURE `p`() BEGIN END;\n",
        "--\n",
        "-- Dumping events for database 'shop'\n",
        "--\n",
        "CREATE EVENT `e` ON SCHEDULE EVERY 1 DAY DO DELETE FROM t;\n",
    );

    assert_eq!(
        scan_kinds(input.as_bytes()),
        vec![
            SectionKind::Header,
            SectionKind::ReplicationInfo,
            SectionKind::Schema,
            SectionKind::TableDefinition,
            SectionKind::TableData,
            SectionKind::ViewTemporaryDefinition,
            SectionKind::ViewDefinition,
            SectionKind::SchemaRoutines,
            SectionKind::SchemaEvents,
        ]
    );
}

#[test]
fn test_gtid_banner_scans_as_other() {
    let input = concat!(
        "-- MySQL dump 10.13\n",
        "--\n",
        "-- GTID state at the beginning of the backup\n",
        "--\n",
        "SET @@GLOBAL.GTID_PURGED='uuid:1-5';\n",
    );
    assert_eq!(
        scan_kinds(input.as_bytes()),
        vec![SectionKind::Header, SectionKind::Other]
    );
}

#[test]
fn test_reassembly_is_lossless() {
    let input = concat!(
        "-- MySQL dump 10.13\n",
        "--\n",
        "-- Host: localhost    Database: shop\n",
        "\r\n",
        "--\n",
        "-- Table structure for table `orders`\n",
        "--\n",
        "CREATE TABLE `orders` (`note` varchar(20) DEFAULT '-- not a marker');\n",
        "--\n",
        "-- ordinary banner, not a marker\n",
        "--\n",
        "-- Dump completed, no trailing newline"
    );
    assert_eq!(reassemble(input.as_bytes()), input.as_bytes());
}

#[test]
fn test_reassembly_of_binary_payload() {
    let mut input: Vec<u8> = Vec::new();
    input.extend_from_slice(b"-- MySQL dump 10.13\n");
    input.extend_from_slice(b"--\n-- Dumping data for table `blobs`\n--\n");
    input.extend_from_slice(b"INSERT INTO `blobs` VALUES ('\x00\x01\xfe\xff');\n");
    assert_eq!(reassemble(&input), input);
}

#[test]
fn test_consecutive_banner_dashes() {
    let input = concat!(
        "line\n",
        "--\n",
        "--\n",
        "-- Dumping data for table `t`\n",
        "--\n",
        "INSERT INTO `t` VALUES (1);\n",
    );
    // the first bare -- stays with the header; the second opens the banner
    let kinds = scan_kinds(input.as_bytes());
    assert_eq!(kinds, vec![SectionKind::Header, SectionKind::TableData]);
    assert_eq!(reassemble(input.as_bytes()), input.as_bytes());
}

#[test]
fn test_extract_identifier_from_marker_variants() {
    assert_eq!(
        extract_identifier(b"-- Table structure for table `orders`\n").unwrap(),
        "orders"
    );
    assert_eq!(
        extract_identifier(b"-- Current Database: `shop`\r\n").unwrap(),
        "shop"
    );
    assert_eq!(
        extract_identifier(b"-- Dumping data for table `with``tick`\n").unwrap(),
        "with`tick"
    );
    assert!(extract_identifier(b"-- Dumping routines for database 'shop'\n").is_err());
}
