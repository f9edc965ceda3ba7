//! C3 linearization of class hierarchies.

use std::sync::Arc;

use ecow::EcoVec;

use super::class::ClassTy;
use super::def::Ty;

/// A stable identity key for linearization bookkeeping.
fn ty_key(ty: &Ty) -> u64 {
    ty.type_id()
        .unwrap_or_else(|| pythia_std::hash::hash64(ty.name().as_str()))
}

/// Computes the C3 linearization of `class`.
///
/// The result starts with the class itself. Synthetic named-tuple bases are
/// excluded (the class records them separately). When the hierarchy admits no
/// consistent linearization, the result degrades to the class followed by its
/// bases in declaration order, deduplicated.
pub fn linearize(class: &Arc<ClassTy>) -> EcoVec<Ty> {
    let bases = class.bases();

    let mut sequences: Vec<Vec<Ty>> = Vec::with_capacity(bases.len() + 1);
    for base in bases.iter() {
        match base {
            Ty::Class(base_class) => {
                let base_mro = base_class.mro();
                if base_mro.is_empty() {
                    sequences.push(vec![base.clone()]);
                } else {
                    sequences.push(base_mro.iter().cloned().collect());
                }
            }
            _ => sequences.push(vec![base.clone()]),
        }
    }
    sequences.push(bases.iter().cloned().collect());

    let mut result = EcoVec::new();
    result.push(Ty::Class(class.clone()));

    match merge(sequences) {
        Some(rest) => {
            for ty in rest {
                result.push(ty);
            }
        }
        None => {
            log::warn!("inconsistent class hierarchy for {}", class.name);
            let mut seen = vec![ty_key(&Ty::Class(class.clone()))];
            for base in bases.iter() {
                let key = ty_key(base);
                if !seen.contains(&key) {
                    seen.push(key);
                    result.push(base.clone());
                }
            }
        }
    }

    result
}

/// The C3 merge step.
///
/// Repeatedly takes the first head that appears in no other sequence's tail.
/// Returns `None` when no such head exists.
fn merge(mut sequences: Vec<Vec<Ty>>) -> Option<Vec<Ty>> {
    let mut result = Vec::new();
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Some(result);
        }

        let candidate = sequences
            .iter()
            .map(|seq| ty_key(&seq[0]))
            .find(|head| {
                !sequences
                    .iter()
                    .any(|seq| seq.iter().skip(1).any(|ty| ty_key(ty) == *head))
            })?;

        let chosen = sequences
            .iter()
            .find(|seq| ty_key(&seq[0]) == candidate)
            .map(|seq| seq[0].clone())
            .expect("candidate head comes from a sequence");
        result.push(chosen);

        for seq in &mut sequences {
            if ty_key(&seq[0]) == candidate {
                seq.remove(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pythia_std::loc::LocationInfo;

    fn class(name: &str) -> Arc<ClassTy> {
        Arc::new(ClassTy::new(name, "m", LocationInfo::EMPTY))
    }

    fn names(mro: &EcoVec<Ty>) -> Vec<String> {
        mro.iter().map(|ty| ty.name().to_string()).collect()
    }

    #[test]
    fn test_diamond_linearization() {
        // classic diamond: D(B, C), B(A), C(A)
        let a = class("A");
        a.set_bases(Vec::<Ty>::new());
        let b = class("B");
        b.set_bases(vec![Ty::Class(a.clone())]);
        let c = class("C");
        c.set_bases(vec![Ty::Class(a.clone())]);
        let d = class("D");
        d.set_bases(vec![Ty::Class(b.clone()), Ty::Class(c.clone())]);

        assert_eq!(names(&d.mro()), vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn test_single_inheritance_chain() {
        let a = class("A");
        a.set_bases(Vec::<Ty>::new());
        let b = class("B");
        b.set_bases(vec![Ty::Class(a.clone())]);
        let c = class("C");
        c.set_bases(vec![Ty::Class(b.clone())]);

        assert_eq!(names(&c.mro()), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_named_tuple_bases_excluded() {
        use super::super::def::NamedTupleTy;

        let nt = Arc::new(NamedTupleTy::new(
            "Point".into(),
            "m".into(),
            LocationInfo::EMPTY,
        ));
        let c = class("C");
        c.set_bases(vec![Ty::NamedTuple(nt)]);

        assert_eq!(names(&c.mro()), vec!["C"]);
        assert_eq!(c.named_tuple_bases().len(), 1);
    }
}
