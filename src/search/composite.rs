use tantivy::query::Bm25StatisticsProvider;
use tantivy::schema::Field;
use tantivy::{DocAddress, Searcher, Term};

/// Several repository searchers viewed as one document space.
///
/// Every segment of every source gets a contiguous range of global document
/// ids; `segment_starts` holds the cumulative document counts, so a global id
/// is resolved to its source by binary search.
pub struct CompositeReader {
    sources: Vec<(String, Searcher)>,
    segment_starts: Vec<u32>,
    /// (source, segment ordinal) of each segment, in global order
    segments: Vec<(usize, u32)>,
    /// Index into `segments` of each source's first segment
    first_segment: Vec<usize>,
    max_doc: u32,
}

impl CompositeReader {
    pub fn new(sources: Vec<(String, Searcher)>) -> Self {
        let mut segment_starts = Vec::new();
        let mut segments = Vec::new();
        let mut first_segment = Vec::with_capacity(sources.len());
        let mut max_doc = 0u32;

        for (source, (_, searcher)) in sources.iter().enumerate() {
            first_segment.push(segments.len());
            for (ord, reader) in searcher.segment_readers().iter().enumerate() {
                segment_starts.push(max_doc);
                segments.push((source, ord as u32));
                max_doc += reader.max_doc();
            }
        }

        Self {
            sources,
            segment_starts,
            segments,
            first_segment,
            max_doc,
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn repository(&self, source: usize) -> &str {
        &self.sources[source].0
    }

    pub fn searcher(&self, source: usize) -> &Searcher {
        &self.sources[source].1
    }

    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Global id of a document found by `source`'s searcher.
    pub fn global_id(&self, source: usize, address: DocAddress) -> u32 {
        let segment = self.first_segment[source] + address.segment_ord as usize;
        self.segment_starts[segment] + address.doc_id
    }

    /// Source and local address of a global id.
    pub fn resolve(&self, global: u32) -> Option<(usize, DocAddress)> {
        if global >= self.max_doc {
            return None;
        }
        let segment = self.segment_starts.partition_point(|&start| start <= global) - 1;
        let (source, segment_ord) = self.segments[segment];
        let doc_id = global - self.segment_starts[segment];
        Some((source, DocAddress::new(segment_ord, doc_id)))
    }
}

/// Corpus statistics summed over every source, so BM25 scores from different
/// repositories are comparable.
impl Bm25StatisticsProvider for CompositeReader {
    fn total_num_tokens(&self, field: Field) -> tantivy::Result<u64> {
        self.sources
            .iter()
            .map(|(_, s)| s.total_num_tokens(field))
            .sum()
    }

    fn total_num_docs(&self) -> tantivy::Result<u64> {
        self.sources.iter().map(|(_, s)| s.total_num_docs()).sum()
    }

    fn doc_freq(&self, term: &Term) -> tantivy::Result<u64> {
        self.sources.iter().map(|(_, s)| s.doc_freq(term)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::{Schema, TEXT};
    use tantivy::{Index, IndexWriter, TantivyDocument};

    /// An in-memory index with one segment per batch.
    fn searcher_with_batches(batches: &[usize]) -> (Searcher, Field) {
        let mut builder = Schema::builder();
        let body = builder.add_text_field("body", TEXT);
        let index = Index::create_in_ram(builder.build());
        let mut writer: IndexWriter = index.writer(15_000_000).unwrap();
        writer.set_merge_policy(Box::new(tantivy::merge_policy::NoMergePolicy));
        for &count in batches {
            for _ in 0..count {
                let mut doc = TantivyDocument::default();
                doc.add_text(body, "needle hay");
                writer.add_document(doc).unwrap();
            }
            writer.commit().unwrap();
        }
        let searcher = index.reader().unwrap().searcher();
        (searcher, body)
    }

    #[test]
    fn test_global_ids_round_trip_across_sources() {
        let (a, _) = searcher_with_batches(&[3, 2]);
        let (b, _) = searcher_with_batches(&[4]);
        let composite = CompositeReader::new(vec![("a".into(), a.clone()), ("b".into(), b)]);
        assert_eq!(composite.max_doc(), 9);

        for (source, searcher) in [(0usize, &a)] {
            for (ord, reader) in searcher.segment_readers().iter().enumerate() {
                for doc in 0..reader.max_doc() {
                    let address = DocAddress::new(ord as u32, doc);
                    let global = composite.global_id(source, address);
                    assert_eq!(composite.resolve(global), Some((source, address)));
                }
            }
        }

        // first document of the second source follows all of the first
        let (source, address) = composite.resolve(5).unwrap();
        assert_eq!(source, 1);
        assert_eq!(composite.repository(source), "b");
        assert_eq!(address, DocAddress::new(0, 0));
        assert_eq!(composite.resolve(9), None);
    }

    #[test]
    fn test_empty_source_takes_no_ids() {
        let (a, _) = searcher_with_batches(&[]);
        let (b, _) = searcher_with_batches(&[2]);
        let composite = CompositeReader::new(vec![("a".into(), a), ("b".into(), b)]);
        assert_eq!(composite.resolve(0).map(|(s, _)| s), Some(1));
    }

    #[test]
    fn test_statistics_are_summed() {
        let (a, body) = searcher_with_batches(&[3]);
        let (b, _) = searcher_with_batches(&[2]);
        let composite = CompositeReader::new(vec![("a".into(), a), ("b".into(), b)]);
        assert_eq!(composite.total_num_docs().unwrap(), 5);
        let term = Term::from_field_text(body, "needle");
        assert_eq!(composite.doc_freq(&term).unwrap(), 5);
        assert_eq!(composite.total_num_tokens(body).unwrap(), 10);
    }
}
