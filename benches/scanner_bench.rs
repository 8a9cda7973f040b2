use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use dumpsplit::defer::split_indexes;
use dumpsplit::scanner::SectionScanner;

fn generate_dump(tables: usize, rows_per_table: usize) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"-- MySQL dump 10.13  Distrib 5.5.30, for Linux (x86_64)\n");
    data.extend_from_slice(b"--\n-- Host: localhost    Database: bench\n--\n");

    for t in 0..tables {
        data.extend_from_slice(
            format!(
                "--\n-- Table structure for table `table_{t}`\n--\n\n\
                 CREATE TABLE `table_{t}` (\n  \
                 `id` int(11) NOT NULL AUTO_INCREMENT,\n  \
                 `name` varchar(255) DEFAULT NULL,\n  \
                 PRIMARY KEY (`id`),\n  \
                 KEY `idx_name` (`name`)\n\
                 ) ENGINE=InnoDB DEFAULT CHARSET=utf8;\n\n"
            )
            .as_bytes(),
        );
        data.extend_from_slice(
            format!("--\n-- Dumping data for table `table_{t}`\n--\n\n").as_bytes(),
        );
        for r in 0..rows_per_table {
            data.extend_from_slice(
                format!("INSERT INTO `table_{t}` VALUES ({r},'Name {r}, with a comma');\n")
                    .as_bytes(),
            );
        }
    }
    data
}

fn bench_scanner_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner_throughput");

    for tables in [10, 100] {
        let data = generate_dump(tables, 100);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("scan_sections", format!("{tables}_tables")),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut scanner = SectionScanner::new(data.as_slice());
                    let mut sections = 0u64;
                    let mut bytes = 0u64;
                    while let Some(mut section) = scanner.next_section().unwrap() {
                        sections += 1;
                        while let Some(line) = section.next_line().unwrap() {
                            bytes += line.len() as u64;
                        }
                    }
                    black_box((sections, bytes))
                });
            },
        );
    }

    group.finish();
}

fn bench_split_indexes(c: &mut Criterion) {
    let ddl = "CREATE TABLE `orders` (\n  \
               `id` int(11) NOT NULL AUTO_INCREMENT,\n  \
               `customer_id` int(11) NOT NULL,\n  \
               `status` varchar(32) DEFAULT 'new,pending',\n  \
               `placed_at` datetime DEFAULT NULL,\n  \
               PRIMARY KEY (`id`),\n  \
               KEY `idx_customer` (`customer_id`),\n  \
               KEY `idx_status` (`status`,`placed_at`),\n  \
               CONSTRAINT `fk_customer` FOREIGN KEY (`customer_id`) REFERENCES `customers` (`id`)\n\
               ) ENGINE=InnoDB DEFAULT CHARSET=utf8;";

    c.bench_function("split_indexes", |b| {
        b.iter(|| split_indexes(black_box(ddl), black_box(true)).unwrap());
    });
}

criterion_group!(benches, bench_scanner_throughput, bench_split_indexes);
criterion_main!(benches);
