//! Ordered tree edit distance (Zhang & Shasha).

#[derive(Debug, Clone, PartialEq)]
pub struct Tree<L> {
    pub label: L,
    pub children: Vec<Tree<L>>,
}

impl<L> Tree<L> {
    pub fn leaf(label: L) -> Self {
        Self {
            label,
            children: Vec::new(),
        }
    }

    pub fn with_children(label: L, children: Vec<Tree<L>>) -> Self {
        Self { label, children }
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Tree::node_count).sum::<usize>()
    }
}

pub trait EditCosts<L> {
    fn rename(&self, from: &L, to: &L) -> f64;

    fn insert(&self, _label: &L) -> f64 {
        1.0
    }

    fn delete(&self, _label: &L) -> f64 {
        1.0
    }
}

/// Postorder view of a tree: labels and the leftmost leaf of each node.
struct Indexed<'a, L> {
    labels: Vec<&'a L>,
    leftmost: Vec<usize>,
    keyroots: Vec<usize>,
}

impl<'a, L> Indexed<'a, L> {
    fn new(tree: &'a Tree<L>) -> Self {
        let mut labels = Vec::new();
        let mut leftmost = Vec::new();
        Self::visit(tree, &mut labels, &mut leftmost);

        // A keyroot is the highest node sharing its leftmost leaf.
        let n = labels.len();
        let mut seen = vec![false; n];
        let mut keyroots = Vec::new();
        for i in (0..n).rev() {
            if !seen[leftmost[i]] {
                seen[leftmost[i]] = true;
                keyroots.push(i);
            }
        }
        keyroots.reverse();

        Self {
            labels,
            leftmost,
            keyroots,
        }
    }

    fn visit(node: &'a Tree<L>, labels: &mut Vec<&'a L>, leftmost: &mut Vec<usize>) -> usize {
        let mut first_leaf = None;
        for child in &node.children {
            let child_leftmost = Self::visit(child, labels, leftmost);
            first_leaf.get_or_insert(child_leftmost);
        }
        let index = labels.len();
        let lml = first_leaf.unwrap_or(index);
        labels.push(&node.label);
        leftmost.push(lml);
        lml
    }
}

pub fn tree_edit_distance<L, C>(a: &Tree<L>, b: &Tree<L>, costs: &C) -> f64
where
    C: EditCosts<L>,
{
    let ta = Indexed::new(a);
    let tb = Indexed::new(b);
    let (na, nb) = (ta.labels.len(), tb.labels.len());
    let mut treedist = vec![vec![0.0_f64; nb]; na];

    for &i in &ta.keyroots {
        for &j in &tb.keyroots {
            forest_distance(&ta, &tb, i, j, costs, &mut treedist);
        }
    }

    treedist[na - 1][nb - 1]
}

fn forest_distance<L, C>(
    ta: &Indexed<'_, L>,
    tb: &Indexed<'_, L>,
    i: usize,
    j: usize,
    costs: &C,
    treedist: &mut [Vec<f64>],
) where
    C: EditCosts<L>,
{
    let (li, lj) = (ta.leftmost[i], tb.leftmost[j]);
    let rows = i - li + 2;
    let cols = j - lj + 2;
    let mut fd = vec![vec![0.0_f64; cols]; rows];

    for x in 1..rows {
        fd[x][0] = fd[x - 1][0] + costs.delete(ta.labels[li + x - 1]);
    }
    for y in 1..cols {
        fd[0][y] = fd[0][y - 1] + costs.insert(tb.labels[lj + y - 1]);
    }

    for x in 1..rows {
        for y in 1..cols {
            let i1 = li + x - 1;
            let j1 = lj + y - 1;
            let delete = fd[x - 1][y] + costs.delete(ta.labels[i1]);
            let insert = fd[x][y - 1] + costs.insert(tb.labels[j1]);
            if ta.leftmost[i1] == li && tb.leftmost[j1] == lj {
                let rename = fd[x - 1][y - 1] + costs.rename(ta.labels[i1], tb.labels[j1]);
                fd[x][y] = delete.min(insert).min(rename);
                treedist[i1][j1] = fd[x][y];
            } else {
                let p = ta.leftmost[i1] - li;
                let q = tb.leftmost[j1] - lj;
                let subtree = fd[p][q] + treedist[i1][j1];
                fd[x][y] = delete.min(insert).min(subtree);
            }
        }
    }
}
